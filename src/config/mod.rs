pub mod storage;

pub use storage::{AverageSetup, RecordingOptions, SetupStorage};
