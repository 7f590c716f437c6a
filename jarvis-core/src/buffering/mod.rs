//! Lock-free SPSC ring buffer for captured samples.
//!
//! The microphone callback pushes into `MicProducer` with the wait-free
//! `push_slice`; the capture loop drains `MicConsumer` on its own thread.

pub mod frame;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the device callback thread.
pub type MicProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the capture loop.
pub type MicConsumer = ringbuf::HeapCons<f32>;

/// 2^20 = 1 048 576 f32 samples ≈ 21.8 s at 48 kHz.
/// Capture is forwarded immediately, so this only absorbs scheduler hiccups.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_mic_ring() -> (MicProducer, MicConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
