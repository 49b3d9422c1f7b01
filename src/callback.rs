//! Visualization callback interface.
//!
//! Sinks hand a copy of outgoing PCM to a registered [`AudioCallback`] so
//! visualizers can render it. Delivery is batched and best-effort; consumers
//! must not assume real-time cadence.

/// Receives copies of outgoing PCM from a sink.
///
/// # Contract
///
/// - `on_initialize` is called synchronously when the callback is
///   registered, before any audio data, so the consumer can size its own
///   buffers for the negotiated format.
/// - `on_audio_data` is called with interleaved PCM in the negotiated
///   format, batched to roughly 50 ms per call. Delivery cadence is chosen
///   by the sink.
pub trait AudioCallback: Send {
    /// Reports the negotiated stream format.
    fn on_initialize(&mut self, channels: u16, sample_rate: u32, bits_per_sample: u16);

    /// Delivers a batch of outgoing PCM bytes.
    fn on_audio_data(&mut self, data: &[u8]);
}

/// Target batch duration for visualization delivery.
const BATCH_MILLIS: u32 = 50;

/// Accumulates outgoing PCM and forwards it to an [`AudioCallback`] in
/// fixed-size batches.
///
/// Owned by a sink; fed from `add_packets` on the control thread, so no
/// locking is needed.
pub(crate) struct VisualizerTap {
    callback: Box<dyn AudioCallback>,
    buf: Vec<u8>,
    batch_bytes: usize,
}

impl VisualizerTap {
    /// Wraps a callback, synchronously informing it of the stream format.
    pub(crate) fn new(
        mut callback: Box<dyn AudioCallback>,
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
    ) -> Self {
        callback.on_initialize(channels, sample_rate, bits_per_sample);

        let bytes_per_second =
            sample_rate as usize * channels as usize * (bits_per_sample as usize / 8);
        // Batch is never zero even for degenerate formats.
        let batch_bytes = (bytes_per_second * BATCH_MILLIS as usize / 1000).max(1);

        Self {
            callback,
            buf: Vec::with_capacity(batch_bytes * 2),
            batch_bytes,
        }
    }

    /// Feeds outgoing PCM, delivering every full batch to the callback.
    pub(crate) fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        while self.buf.len() >= self.batch_bytes {
            let rest = self.buf.split_off(self.batch_bytes);
            self.callback.on_audio_data(&self.buf);
            self.buf = rest;
        }
    }

    /// Drops any partial batch. Called on flush so stale PCM is not
    /// delivered after a seek.
    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }
}
