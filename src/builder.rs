//! Sink construction and device orchestration.
//!
//! `SinkBuilder` is the front door of the crate: it asks the arbiter to
//! compute a speaker configuration, claims the right device kind, and
//! opens the hardware backend, falling back to the silent backend when
//! the hardware cannot be opened. Callers that want a specific backend
//! can still construct one directly.

use std::time::Duration;

use crate::sink::{AudioSink, DeviceSink, NullSink};
use crate::{DeviceKind, EventCallback, OutputSettings, PollConfig, SharedArbiter};

/// Stream parameters for a sink.
///
/// Describes the PCM (or encoded bitstream) the caller will feed, not
/// the device's native format.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// Interleaved channel count of the incoming stream.
    pub channels: u16,
    /// Sample rate of the incoming stream in Hz.
    pub sample_rate: u32,
    /// Bits per sample; only 16 is accepted by the hardware backend.
    pub bits_per_sample: u16,
    /// Codec name used to resolve the channel interleaving, e.g. "AAC".
    pub codec_hint: String,
    /// Number of packets the ring buffers.
    pub packet_count: usize,
    /// Packet size in bytes; defaults to one packet per 256 frames.
    pub packet_size: Option<usize>,
    /// True when the stream carries encoded frames for an external
    /// receiver. Locks volume and bypasses channel remapping.
    pub passthrough: bool,
    /// Allow the platform to resample when the device's native rate
    /// differs from `sample_rate`.
    pub resample: bool,
    /// Polling cadence for drain waits.
    pub poll: PollConfig,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            codec_hint: "PCM".to_string(),
            packet_count: 16,
            packet_size: None,
            passthrough: false,
            resample: true,
            poll: PollConfig::default(),
        }
    }
}

impl SinkOptions {
    /// Packet size in bytes, derived from the frame size when not set
    /// explicitly.
    pub fn effective_packet_size(&self) -> usize {
        self.packet_size.unwrap_or_else(|| {
            let frame = self.channels as usize * (self.bits_per_sample as usize / 8).max(1);
            frame * 256
        })
    }
}

/// Builder for an audio sink bound to an arbiter's device.
///
/// ```no_run
/// use audio_output::{DeviceArbiter, OutputSettings, SinkBuilder};
///
/// let arbiter = DeviceArbiter::new().into_shared();
/// let settings = OutputSettings::default();
/// let mut sink = SinkBuilder::new()
///     .channels(2)
///     .sample_rate(48000)
///     .codec_hint("AAC")
///     .build(&arbiter, &settings);
/// ```
#[derive(Default)]
pub struct SinkBuilder {
    options: SinkOptions,
    is_music: bool,
    events: Option<EventCallback>,
}

impl SinkBuilder {
    /// Creates a builder with stereo 48 kHz 16-bit defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interleaved channel count.
    pub fn channels(mut self, channels: u16) -> Self {
        self.options.channels = channels;
        self
    }

    /// Sets the stream sample rate in Hz.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.options.sample_rate = rate;
        self
    }

    /// Sets bits per sample of the incoming stream.
    pub fn bits_per_sample(mut self, bits: u16) -> Self {
        self.options.bits_per_sample = bits;
        self
    }

    /// Sets the codec hint used to resolve channel interleaving.
    pub fn codec_hint(mut self, hint: impl Into<String>) -> Self {
        self.options.codec_hint = hint.into();
        self
    }

    /// Sets the ring geometry.
    pub fn packets(mut self, count: usize, size: usize) -> Self {
        self.options.packet_count = count;
        self.options.packet_size = Some(size);
        self
    }

    /// Marks the stream as an encoded bitstream for an external receiver.
    pub fn passthrough(mut self, passthrough: bool) -> Self {
        self.options.passthrough = passthrough;
        self
    }

    /// Marks the stream as music rather than video content. Music never
    /// triggers all-speaker duplication.
    pub fn music(mut self, is_music: bool) -> Self {
        self.is_music = is_music;
        self
    }

    /// Overrides the drain polling cadence.
    pub fn poll(mut self, interval: Duration, timeout: Duration) -> Self {
        self.options.poll = PollConfig { interval, timeout };
        self
    }

    /// Installs a callback for asynchronous output events.
    pub fn events(mut self, events: EventCallback) -> Self {
        self.events = Some(events);
        self
    }

    /// Resolves the speaker configuration, claims the device, and opens
    /// a sink on it.
    ///
    /// Never fails: when the hardware backend cannot be opened the sink
    /// degrades to the silent backend, which consumes data in real time
    /// so playback timing survives. The degradation is logged.
    pub fn build(self, arbiter: &SharedArbiter, settings: &OutputSettings) -> Box<dyn AudioSink> {
        let mut options = self.options;
        if options.channels == 0 {
            options.channels = 2;
        }

        {
            let mut arb = arbiter.lock();
            arb.setup_speaker_config(
                options.channels,
                settings.all_speakers,
                self.is_music,
                settings,
            );
            options.passthrough = options.passthrough && settings.passthrough_enabled;

            let kind = if options.passthrough {
                DeviceKind::DigitalPassthrough
            } else {
                DeviceKind::DirectOutput
            };
            if let Err(e) = arb.set_active_device(kind, settings) {
                tracing::warn!(?kind, error = %e, "device claim failed");
            }
        }

        match DeviceSink::new(arbiter.clone(), settings, &options, self.events.clone()) {
            Ok(mut sink) => {
                if !options.passthrough {
                    // Volume was clamped at construction; ignore is safe.
                    let _ = sink.set_current_volume(settings.volume);
                }
                Box::new(sink)
            }
            Err(e) => {
                tracing::warn!(error = %e, "hardware sink unavailable, using silent output");
                Box::new(NullSink::new(arbiter.clone(), &options))
            }
        }
    }
}
