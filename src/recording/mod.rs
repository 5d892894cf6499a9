pub mod frame;
pub mod recorder;

pub use frame::{decode_blocks, encode_block, BLOCK_MAGIC};
pub use recorder::{EnsembleRecorder, RecorderConfig};
