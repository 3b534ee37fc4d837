//! audio - Audio capture, playback, and processing library
//!
//! Uses ALSA for audio I/O, a fixed delay line for the real-time echo
//! effect on the capture path, and hound for the WAV wire format.

mod alsa_device;
mod audio_system;
pub mod echo;
pub mod stream_decoder;
pub mod wav;

pub use audio_system::{AudioConfig, AudioSystem, CaptureEvent};
pub use echo::EchoProcessor;
pub use stream_decoder::StreamDecoder;
