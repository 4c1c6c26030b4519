pub mod audio;
pub mod device;
pub mod framer;

pub use audio::{AudioChunk, DecodeError, SESSION_SAMPLE_RATE};
pub use framer::Pcm16Framer;
