//! Audio plumbing for the Murmur voice engine.
//!
//! - [`codec`]: float samples to 16-bit PCM and base64 transport text.
//! - [`capture`]: microphone frames at 16 kHz with per-frame loudness.
//! - [`playback`]: gap-free scheduling of inbound speech on the output
//!   device timeline.
//! - [`device`]: the backend traits both sit on, with a cpal implementation
//!   in [`cpal_backend`].
//!
//! Enable the `testing` feature for scripted devices that run without
//! hardware.

pub mod capture;
pub mod codec;
pub mod cpal_backend;
pub mod device;
pub mod error;
pub mod playback;
pub mod resample;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use capture::{CaptureConfig, CaptureUnit};
pub use cpal_backend::CpalBackend;
pub use device::{AudioBackend, InputFormat, InputStream, OutputDevice};
pub use error::{AudioError, CodecError};
pub use playback::{PlaybackScheduler, Scheduled, IDLE_TOLERANCE_SECS};
