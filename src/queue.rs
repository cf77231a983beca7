//! Sample hand-off from the acquisition thread to the tick handler

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Instant;

/// One decoded constellation point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// In-phase component
    pub i: i8,
    /// Quadrature component
    pub q: i8,
    /// When the reply was received
    pub timestamp: Instant,
}

impl Sample {
    pub fn new(i: i8, q: i8, timestamp: Instant) -> Self {
        Self { i, q, timestamp }
    }

    /// The (I, Q) pair without its timestamp
    pub fn point(&self) -> (i8, i8) {
        (self.i, self.q)
    }
}

/// Unbounded FIFO between acquisition and display
///
/// The queue itself is the consuming end; [`SampleQueue::producer`] hands out the
/// sending end that the acquisition thread owns.
pub struct SampleQueue {
    tx: Sender<Sample>,
    rx: Receiver<Sample>,
}

/// Sending end of a [`SampleQueue`]
#[derive(Clone)]
pub struct SampleProducer {
    tx: Sender<Sample>,
}

impl SampleProducer {
    /// Enqueue a sample without blocking
    ///
    /// Returns `false` if the consuming side has been dropped; the sample is lost.
    pub fn push(&self, sample: Sample) -> bool {
        self.tx.send(sample).is_ok()
    }
}

impl SampleQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn producer(&self) -> SampleProducer {
        SampleProducer { tx: self.tx.clone() }
    }

    pub fn push(&self, sample: Sample) {
        // The receiver lives in `self`, so this cannot fail
        let _ = self.tx.send(sample);
    }

    /// Remove and return every sample present at the time of the call
    ///
    /// Never blocks. Samples pushed while draining stay queued for the next call.
    pub fn drain_all(&self) -> Vec<Sample> {
        let present = self.rx.len();
        self.rx.try_iter().take(present).collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}
