pub mod accumulator;
pub mod manager;
pub mod options;

pub use accumulator::AverageAccumulator;
pub use manager::{AverageKind, AverageManager};
pub use options::{AverageOptions, FieldSettings, ReferenceLayer, WindowMode};
