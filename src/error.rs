//! Error types for audio-output.
//!
//! Errors are split into two categories:
//! - **Construction errors** ([`AudioOutputError`]): prevent a device or sink
//!   from being created
//! - **Operation errors** ([`SinkError`]): returned by individual sink
//!   operations on an already-constructed sink
//!
//! Neither category is ever allowed to panic across the crate boundary.
//! Callers that cannot recover from a construction error are expected to
//! fall back to the null sink rather than propagate further.

/// Fatal errors raised while constructing a device handle or sink backend.
///
/// These are returned from the device arbiter and from backend constructors.
/// A failed construction always leaves the arbiter in the `None` state and
/// the sink unallocated - there is no half-constructed state to clean up.
#[derive(Debug, thiserror::Error)]
pub enum AudioOutputError {
    /// The requested output device was not found.
    #[error("output device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultDevice,

    /// No digital-capable output device could be located for passthrough.
    #[error("no digital output device available for passthrough")]
    NoDigitalDevice,

    /// The arbiter holds no active device; sinks cannot be constructed.
    ///
    /// Returned when a backend is built before `set_active_device` succeeded,
    /// or after the device was removed.
    #[error("device arbiter holds no active device")]
    NoActiveDevice,

    /// The requested sample format is not supported by the device.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// The requested sample rate is not supported and resampling was not
    /// requested.
    #[error("sample rate {requested}Hz not supported by device (native: {native}Hz)")]
    UnsupportedSampleRate {
        /// The requested sample rate.
        requested: u32,
        /// The device's native sample rate.
        native: u32,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

/// Recoverable errors returned by individual sink operations.
///
/// Operations that return `SinkError` leave the sink in a usable state;
/// the caller may retry, flush, or continue as appropriate.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink was used before successful initialization or after
    /// deinitialization.
    #[error("sink not allocated (initialization failed or already torn down)")]
    NotAllocated,

    /// Volume changes are rejected while encoded passthrough is playing.
    ///
    /// The decoder on the receiving end owns loudness for passthrough
    /// streams.
    #[error("volume is fixed during encoded passthrough playback")]
    VolumeLocked,

    /// `wait_completion` gave up before all packets were consumed.
    #[error("drain timed out after {waited_ms}ms with {remaining} bytes pending")]
    DrainTimeout {
        /// How long the poll loop waited.
        waited_ms: u64,
        /// Bytes still buffered when the timeout expired.
        remaining: usize,
    },

    /// The platform stream refused a pause/resume transition.
    #[error("stream control failed: {reason}")]
    StreamControl {
        /// Description of what went wrong.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_output_error_display() {
        let err = AudioOutputError::DeviceNotFound {
            name: "SPDIF Out".to_string(),
        };
        assert_eq!(err.to_string(), "output device not found: SPDIF Out");
    }

    #[test]
    fn test_unsupported_sample_rate_display() {
        let err = AudioOutputError::UnsupportedSampleRate {
            requested: 96000,
            native: 48000,
        };
        assert!(err.to_string().contains("96000"));
        assert!(err.to_string().contains("48000"));
    }

    #[test]
    fn test_sink_error_drain_timeout() {
        let err = SinkError::DrainTimeout {
            waited_ms: 500,
            remaining: 4096,
        };
        assert!(err.to_string().contains("500ms"));
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_sink_error_volume_locked() {
        let err = SinkError::VolumeLocked;
        assert!(err.to_string().contains("passthrough"));
    }
}
