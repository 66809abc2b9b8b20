pub mod decoder;
pub mod loudness;
pub mod window;

pub use decoder::{Codec, FrameDecoder, PcmDecoder, CHANNELS, FRAME_SIZE};
pub use loudness::decibels;
pub use window::{EvaluationWindow, WINDOW_CHUNKS};
