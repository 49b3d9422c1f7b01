//! Shared packet-ring bookkeeping for sink backends.
//!
//! Every backend buffers PCM as a ring of fixed-size packets: a packet is
//! free until a whole packet of bytes has been written into it, pending
//! until the platform consumes those bytes. This component centralizes the
//! bookkeeping that used to be re-derived per backend, parameterized by
//! packet size and count.
//!
//! The transport is a lock-free SPSC byte ring. The producer side stays on
//! the control thread; the consumer side is shared behind a mutex so both
//! the platform's audio callback (popping frames) and control-side flushes
//! can reach it. The lock is held only for short pops and clears.

use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Consumer half of a packet ring, shared with the platform callback.
pub(crate) type SharedConsumer = Arc<Mutex<HeapCons<u8>>>;

/// A ring of `packet_count` fixed-size packets of PCM bytes.
pub(crate) struct PacketRing {
    producer: HeapProd<u8>,
    consumer: SharedConsumer,
    packet_size: usize,
    packet_count: usize,
}

impl PacketRing {
    /// Creates a ring holding exactly `packet_count * packet_size` bytes.
    pub(crate) fn new(packet_count: usize, packet_size: usize) -> Self {
        let ring = HeapRb::<u8>::new(packet_count * packet_size);
        let (producer, consumer) = ring.split();
        Self {
            producer,
            consumer: Arc::new(Mutex::new(consumer)),
            packet_size,
            packet_count,
        }
    }

    /// Natural write granularity in bytes.
    pub(crate) fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Total capacity in bytes.
    pub(crate) fn capacity_bytes(&self) -> usize {
        self.packet_count * self.packet_size
    }

    /// Bytes that can be accepted right now, rounded down to whole packets.
    ///
    /// Safe to call at any time; the consumer may pop concurrently, in
    /// which case this under-reports (never over-reports).
    pub(crate) fn space(&self) -> usize {
        (self.producer.vacant_len() / self.packet_size) * self.packet_size
    }

    /// Bytes written but not yet consumed by the platform.
    pub(crate) fn buffered_bytes(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Count of packets currently pending (partially consumed packets
    /// still count as pending).
    pub(crate) fn pending_packets(&self) -> usize {
        self.buffered_bytes().div_ceil(self.packet_size)
    }

    /// Writes as many *whole* packets from `data` as fit.
    ///
    /// Never writes a partial packet: a trailing fragment smaller than one
    /// packet is left unconsumed for the caller to retry once more data
    /// has accumulated. Returns the number of bytes written.
    pub(crate) fn write(&mut self, data: &[u8]) -> usize {
        let usable = data.len().min(self.space());
        let usable = (usable / self.packet_size) * self.packet_size;
        if usable == 0 {
            return 0;
        }
        self.producer.push_slice(&data[..usable])
    }

    /// Discards up to `max` buffered bytes, returning how many were
    /// dropped. Models the platform consuming data for backends without a
    /// real consumer thread.
    pub(crate) fn consume(&mut self, max: usize) -> usize {
        self.consumer.lock().skip(max)
    }

    /// Drops all pending bytes. Safe when nothing is queued.
    pub(crate) fn clear(&mut self) {
        self.consumer.lock().clear();
    }

    /// Clone of the consumer half for the platform callback thread.
    pub(crate) fn consumer(&self) -> SharedConsumer {
        self.consumer.clone()
    }
}
