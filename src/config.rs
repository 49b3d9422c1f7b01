//! Configuration types for audio output.

use std::time::Duration;

/// Maximum volume: no attenuation.
pub const VOLUME_MAXIMUM: i32 = 0;

/// Minimum volume: -60 dB of attenuation, treated as silence.
pub const VOLUME_MINIMUM: i32 = -6000;

/// Read-only settings this crate consumes from the surrounding application.
///
/// The settings store itself is out of scope; playback code constructs an
/// `OutputSettings` snapshot from whatever configuration system it uses and
/// hands it to the arbiter and sink builder. Nothing in this crate ever
/// writes settings back.
///
/// # Example
///
/// ```
/// use audio_output::OutputSettings;
///
/// let settings = OutputSettings {
///     passthrough_enabled: true,
///     passthrough_device: "iec958:CARD=0".to_string(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Current global volume as attenuation in millibels (hundredths of a
    /// decibel). [`VOLUME_MAXIMUM`] is full volume, [`VOLUME_MINIMUM`] is
    /// silence.
    pub volume: i32,

    /// Output device name for standard PCM playback. Empty selects the
    /// system default output.
    pub audio_device: String,

    /// Output device name for digital/encoded passthrough. Empty lets the
    /// arbiter search for a digital-capable device.
    pub passthrough_device: String,

    /// Whether encoded passthrough (AC3/DTS to an external receiver) is
    /// globally enabled.
    pub passthrough_enabled: bool,

    /// Whether an AC3 encoder is available for multi-channel encoding.
    pub ac3_encoder: bool,

    /// Whether stereo content should be duplicated to all speakers.
    pub all_speakers: bool,

    /// Whether to use high-quality resampling when the device cannot run
    /// at the requested rate.
    pub hq_resample: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            volume: VOLUME_MAXIMUM,
            audio_device: String::new(),
            passthrough_device: String::new(),
            passthrough_enabled: false,
            ac3_encoder: false,
            all_speakers: false,
            hq_resample: false,
        }
    }
}

/// Timing for bounded poll loops (`wait_completion` and friends).
///
/// No target platform offers a blocking completion primitive for every
/// backend, so draining is a poll loop. The interval and timeout are
/// explicit so tests can run the loops with zero delay.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Sleep between poll iterations.
    pub interval: Duration,

    /// Give up after this long and report [`SinkError::DrainTimeout`].
    ///
    /// [`SinkError::DrainTimeout`]: crate::SinkError::DrainTimeout
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        }
    }
}

impl PollConfig {
    /// A configuration that performs a single check and never sleeps.
    ///
    /// Intended for tests, where waiting on a real-time playback clock
    /// is unacceptable.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }
}
