//! Null sink: packet-ring output with no hardware behind it.

use std::time::Instant;

use crate::builder::SinkOptions;
use crate::callback::VisualizerTap;
use crate::sink::{AudioSink, PacketRing};
use crate::{AudioCallback, SharedArbiter, SinkError, VOLUME_MAXIMUM, VOLUME_MINIMUM};

/// A sink that consumes packets on a simulated real-time clock.
///
/// Used as the fail-safe fallback when hardware construction fails, and as
/// the portable backend for automated tests. Packet accounting, latency
/// reporting, and the full pause/volume/flush contract behave exactly as
/// on a hardware backend; the "platform" is a clock that drains the ring
/// at the nominal byte rate.
///
/// Construction never fails, so a `NullSink` is always allocated.
///
/// Paused policy: data is accepted while paused (the clock is stopped, so
/// nothing drains until resume). This diverges from [`DeviceSink`], which
/// refuses data while paused.
///
/// [`DeviceSink`]: crate::DeviceSink
pub struct NullSink {
    ring: PacketRing,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    byte_rate: f64,
    volume: i32,
    muted: bool,
    paused: bool,
    allocated: bool,
    passthrough: bool,
    viz: Option<VisualizerTap>,
    poll: crate::PollConfig,
    arbiter: SharedArbiter,
    last_advance: Instant,
    carry: f64,
}

impl NullSink {
    /// Creates a null sink for the given format.
    #[must_use]
    pub fn new(arbiter: SharedArbiter, options: &SinkOptions) -> Self {
        let packet_size = options.effective_packet_size();
        let byte_rate = f64::from(options.sample_rate)
            * f64::from(options.channels)
            * f64::from(options.bits_per_sample / 8);

        tracing::debug!(
            channels = options.channels,
            sample_rate = options.sample_rate,
            packet_size,
            "null sink allocated"
        );

        Self {
            ring: PacketRing::new(options.packet_count, packet_size),
            channels: options.channels,
            sample_rate: options.sample_rate,
            bits_per_sample: options.bits_per_sample,
            byte_rate: byte_rate.max(1.0),
            volume: VOLUME_MAXIMUM,
            muted: false,
            paused: false,
            allocated: true,
            passthrough: options.passthrough,
            viz: None,
            poll: options.poll,
            arbiter,
            last_advance: Instant::now(),
            carry: 0.0,
        }
    }

    /// Consumes whatever the simulated clock says has played since the
    /// last call. A fractional-byte carry keeps long-run drain exact.
    fn advance(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_advance);
        self.last_advance = now;
        if self.paused {
            return;
        }

        let budget = elapsed.as_secs_f64() * self.byte_rate + self.carry;
        let whole = budget.floor();
        self.carry = budget - whole;
        if whole >= 1.0 {
            self.ring.consume(whole as usize);
        }
    }
}

impl AudioSink for NullSink {
    fn is_allocated(&self) -> bool {
        self.allocated
    }

    fn get_space(&self) -> usize {
        if !self.allocated {
            return 0;
        }
        self.ring.space()
    }

    fn add_packets(&mut self, data: &[u8]) -> usize {
        if !self.allocated {
            return 0;
        }
        self.advance();

        let consumed = self.ring.write(data);
        if consumed > 0 && !self.passthrough {
            if let Some(ref mut viz) = self.viz {
                viz.push(&data[..consumed]);
            }
        }
        consumed
    }

    fn get_delay(&self) -> f64 {
        if !self.allocated {
            return 0.0;
        }
        (self.ring.buffered_bytes() as f64 / self.byte_rate).max(0.0)
    }

    fn get_chunk_len(&self) -> usize {
        self.ring.packet_size()
    }

    fn pause(&mut self) -> Result<(), SinkError> {
        if !self.allocated {
            return Err(SinkError::NotAllocated);
        }
        if self.paused {
            return Ok(());
        }
        self.advance();
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        if !self.allocated {
            return Err(SinkError::NotAllocated);
        }
        if !self.paused {
            return Ok(());
        }
        self.paused = false;
        self.muted = false;
        self.last_advance = Instant::now();
        self.carry = 0.0;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        if !self.allocated {
            return Err(SinkError::NotAllocated);
        }
        self.flush();
        Ok(())
    }

    fn flush(&mut self) {
        self.ring.clear();
        self.carry = 0.0;
        if let Some(ref mut viz) = self.viz {
            viz.clear();
        }
    }

    fn set_current_volume(&mut self, millibels: i32) -> Result<(), SinkError> {
        if !self.allocated {
            return Err(SinkError::NotAllocated);
        }
        if self.passthrough {
            return Err(SinkError::VolumeLocked);
        }
        self.volume = millibels.clamp(VOLUME_MINIMUM, VOLUME_MAXIMUM);
        Ok(())
    }

    fn get_current_volume(&self) -> i32 {
        self.volume
    }

    fn mute(&mut self, mute: bool) {
        self.muted = mute;
    }

    fn wait_completion(&mut self) -> Result<(), SinkError> {
        if !self.allocated {
            return Ok(());
        }
        let start = Instant::now();
        loop {
            self.advance();
            if self.ring.buffered_bytes() == 0 {
                return Ok(());
            }
            if start.elapsed() >= self.poll.timeout {
                tracing::debug!(
                    pending = self.ring.pending_packets(),
                    "drain timed out"
                );
                return Err(SinkError::DrainTimeout {
                    waited_ms: start.elapsed().as_millis() as u64,
                    remaining: self.ring.buffered_bytes(),
                });
            }
            std::thread::sleep(self.poll.interval);
        }
    }

    fn register_audio_callback(&mut self, callback: Box<dyn AudioCallback>) {
        self.viz = Some(VisualizerTap::new(
            callback,
            self.channels,
            self.sample_rate,
            self.bits_per_sample,
        ));
    }

    fn unregister_audio_callback(&mut self) {
        self.viz = None;
    }

    fn pump(&mut self) {
        if self.allocated {
            self.advance();
        }
    }

    fn deinitialize(&mut self) {
        if !self.allocated {
            return;
        }
        if self.paused {
            // The simulated clock is stopped; the ring can never drain.
            self.flush();
        } else if let Err(e) = self.wait_completion() {
            tracing::debug!(error = %e, "null sink drained incompletely, flushing");
            self.flush();
        }
        self.viz = None;
        self.allocated = false;
        self.arbiter.lock().remove_active_device();
    }
}

impl Drop for NullSink {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
