//! # audio-output
//!
//! Playback output layer with exclusive device arbitration.
//!
//! `audio-output` provides packet-based PCM playback via CPAL behind a
//! single arbiter that owns the shared hardware handle. Decoders feed
//! whole packets; the sink reports buffered delay so callers can keep
//! audio and video in sync.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use audio_output::{DeviceArbiter, OutputSettings, SinkBuilder};
//!
//! let arbiter = DeviceArbiter::new().into_shared();
//! let settings = OutputSettings::default();
//!
//! let mut sink = SinkBuilder::new()
//!     .channels(2)
//!     .sample_rate(48000)
//!     .codec_hint("AAC")
//!     .build(&arbiter, &settings);
//!
//! while let Some(packet) = decoder.next_packet() {
//!     while sink.get_space() < packet.len() {
//!         std::thread::sleep(std::time::Duration::from_millis(5));
//!     }
//!     sink.add_packets(&packet);
//! }
//! sink.wait_completion()?;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Arbiter**: One instance owns the hardware handle; sinks claim and
//!   release through it, never holding the platform device directly
//! - **Ring Buffer**: Lock-free SPSC queue between the feeding thread and
//!   the platform playback callback
//! - **CPAL Thread**: Pops whole frames, applies gain and channel
//!   remapping, plays silence on starvation
//!
//! Sinks degrade to a silent real-time backend when hardware is absent,
//! so playback timing survives on headless machines.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod arbiter;
mod builder;
mod callback;
pub mod channel_map;
mod config;
mod device;
mod error;
mod event;
mod sink;

pub use arbiter::{DeviceArbiter, DeviceKind, DeviceObserver, SharedArbiter, SpeakerLayout};
pub use builder::{SinkBuilder, SinkOptions};
pub use callback::AudioCallback;
pub use config::{OutputSettings, PollConfig, VOLUME_MAXIMUM, VOLUME_MINIMUM};
pub use device::{
    default_output_device_name, list_output_devices, CpalOpener, DeviceHandle, DeviceOpener,
    MockOpener,
};
pub use error::{AudioOutputError, SinkError};
pub use event::{event_callback, EventCallback, OutputEvent};
pub use sink::{AudioSink, DeviceSink, NullSink};
