pub mod buffer;
pub mod decode;
pub mod encode;

pub use buffer::AudioBuffer;
pub use decode::decode_audio;
pub use encode::encode_wav;
