//! Sink trait and backend implementations for audio output.
//!
//! An [`AudioSink`] is the packet-ring object a playback engine writes PCM
//! into. The crate provides two backends:
//!
//! - [`DeviceSink`]: real hardware output through CPAL
//! - [`NullSink`]: a portable fallback that consumes data on a simulated
//!   real-time clock, usable in tests and as the fail-safe when hardware
//!   construction fails
//!
//! Backends are selected at runtime by [`SinkBuilder`](crate::SinkBuilder),
//! never by compile-time platform switches.

mod device_sink;
mod null;
mod packet_ring;

pub use device_sink::DeviceSink;
pub use null::NullSink;

pub(crate) use packet_ring::PacketRing;

use crate::{AudioCallback, SinkError};

/// A packet-ring audio output.
///
/// # Contract
///
/// - A sink drives no thread of its own: the playback engine polls it
///   (`add_packets`, [`pump`](AudioSink::pump)) from a single control
///   thread. Instances are not safe for concurrent use.
/// - Writes happen in whole packets of [`get_chunk_len`](AudioSink::get_chunk_len)
///   bytes; a trailing partial packet is never consumed.
/// - Every operation is a guarded no-op (returning zero or
///   [`SinkError::NotAllocated`]) once the sink has been deinitialized.
///
/// State machine per instance:
/// `Unallocated -> Allocated -> {Paused <-> Playing} -> Draining -> Unallocated`.
/// `Allocated` is only entered by fully successful construction; any
/// failure leaves the instance unusable except for destruction.
pub trait AudioSink {
    /// Whether initialization succeeded and the sink has not been torn
    /// down.
    fn is_allocated(&self) -> bool;

    /// Bytes the sink can accept right now without blocking.
    ///
    /// Safe to call at any time, including while paused.
    fn get_space(&self) -> usize;

    /// Accepts PCM, writing as many whole packets as fit.
    ///
    /// Returns the number of bytes consumed, always a multiple of
    /// [`get_chunk_len`](AudioSink::get_chunk_len) and never more than
    /// `min(data.len(), get_space())`. A remainder smaller than one packet
    /// is left for the caller to retry once more data has accumulated.
    ///
    /// Behavior while paused is backend-specific: [`DeviceSink`] refuses
    /// data (returns 0), [`NullSink`] accepts it (its clock is simply
    /// stopped).
    fn add_packets(&mut self, data: &[u8]) -> usize;

    /// Estimated output latency in seconds: buffered-but-unplayed audio
    /// plus a fixed per-path constant. Never negative.
    fn get_delay(&self) -> f64;

    /// The packet size callers should align writes to.
    ///
    /// A natural granularity, not a hard minimum - see
    /// [`add_packets`](AudioSink::add_packets).
    fn get_chunk_len(&self) -> usize;

    /// Stops the platform stream and refuses further transitions of the
    /// same kind. Idempotent: pausing while paused is a successful no-op.
    fn pause(&mut self) -> Result<(), SinkError>;

    /// Restarts playback at the previously selected volume. Idempotent.
    fn resume(&mut self) -> Result<(), SinkError>;

    /// Flushes pending packets and resets warm-up state. The platform
    /// handle survives; the sink is immediately reusable.
    fn stop(&mut self) -> Result<(), SinkError>;

    /// Drops all pending packets and resets byte accounting. Safe to call
    /// when nothing is queued.
    fn flush(&mut self);

    /// Sets the volume as attenuation in millibels.
    ///
    /// # Errors
    ///
    /// Passthrough sinks return [`SinkError::VolumeLocked`]; the decoder
    /// on the receiving end owns loudness.
    fn set_current_volume(&mut self, millibels: i32) -> Result<(), SinkError>;

    /// The currently selected volume in millibels. Unaffected by mute.
    fn get_current_volume(&self) -> i32;

    /// Forces effective volume to the minimum without discarding the
    /// selected volume; `mute(false)` restores it.
    fn mute(&mut self, mute: bool);

    /// Blocks in a bounded poll loop until all submitted packets have been
    /// consumed by the platform.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::DrainTimeout`] if the configured timeout
    /// expires first.
    fn wait_completion(&mut self) -> Result<(), SinkError>;

    /// Attaches the visualization callback, synchronously informing it of
    /// the negotiated format. Replaces any previous callback.
    fn register_audio_callback(&mut self, callback: Box<dyn AudioCallback>);

    /// Detaches the visualization callback, if any.
    fn unregister_audio_callback(&mut self);

    /// Periodic housekeeping hook; backends that model their own playback
    /// clock advance it here. Call regularly from the polling loop.
    fn pump(&mut self) {}

    /// Drains pending audio, releases platform resources, and relinquishes
    /// the shared device through the arbiter.
    ///
    /// Idempotent, and invoked from `Drop` when not already called. After
    /// this, only destruction is valid.
    fn deinitialize(&mut self);
}

/// Converts millibel attenuation to a linear amplitude gain.
///
/// [`VOLUME_MINIMUM`](crate::VOLUME_MINIMUM) and below collapse to exactly
/// zero so "minimum volume" is true silence rather than -60 dB.
pub(crate) fn millibel_to_gain(millibels: i32) -> f32 {
    if millibels <= crate::VOLUME_MINIMUM {
        return 0.0;
    }
    let millibels = millibels.min(crate::VOLUME_MAXIMUM);
    // millibels are hundredths of a dB; amplitude = 10^(dB / 20).
    10f32.powf(millibels as f32 / 2000.0)
}

/// Selects the bytes written for an encoded-passthrough packet.
///
/// A muted passthrough stream substitutes silence of equal length instead
/// of skipping the write, so the receiving decoder's clock keeps
/// advancing.
pub(crate) fn passthrough_payload<'a>(
    data: &'a [u8],
    muted: bool,
    scratch: &'a mut Vec<u8>,
) -> &'a [u8] {
    if muted {
        scratch.clear();
        scratch.resize(data.len(), 0);
        scratch
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_at_maximum_is_unity() {
        assert!((millibel_to_gain(crate::VOLUME_MAXIMUM) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gain_at_minimum_is_zero() {
        assert_eq!(millibel_to_gain(crate::VOLUME_MINIMUM), 0.0);
        assert_eq!(millibel_to_gain(crate::VOLUME_MINIMUM - 1000), 0.0);
    }

    #[test]
    fn test_gain_halves_every_six_db() {
        // -600 mB = -6 dB, roughly half amplitude.
        let gain = millibel_to_gain(-600);
        assert!((gain - 0.501).abs() < 0.01);
    }

    #[test]
    fn test_gain_clamps_above_maximum() {
        assert!((millibel_to_gain(500) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_muted_passthrough_substitutes_silence() {
        let data = [0x5au8; 32];
        let mut scratch = Vec::new();

        let payload = passthrough_payload(&data, true, &mut scratch);
        assert_eq!(payload.len(), data.len());
        assert!(payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unmuted_passthrough_keeps_encoded_bytes() {
        let data = [0x5au8; 32];
        let mut scratch = Vec::new();

        let payload = passthrough_payload(&data, false, &mut scratch);
        assert_eq!(payload, &data[..]);
        assert!(scratch.is_empty());
    }
}
