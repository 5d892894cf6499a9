pub mod command;

pub use command::{send_command, CommandPort, DEFAULT_REPLY_TIMEOUT};
