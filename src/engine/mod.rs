pub mod dispatcher;
pub mod runtime;

pub use dispatcher::{Dispatcher, WorkHandler};
pub use runtime::{AveragedEvent, AveragingRuntime, RuntimeConfig, RuntimeStatus};
