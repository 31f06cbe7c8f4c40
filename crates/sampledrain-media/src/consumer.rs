//! Sample delivery.

use crate::{Error, Result};
use bytes::Bytes;
use tokio::sync::mpsc;

/// One emitted sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Index of the source track within the session.
    pub track_index: usize,
    /// Index of the sample within its track.
    pub sample_index: usize,
    /// Raw sample bytes as stored in the container.
    pub payload: Bytes,
    /// Sample duration in milliseconds.
    pub duration_ms: f64,
    /// Decode time of the sample in milliseconds.
    pub decode_time_ms: f64,
    /// Whether the sample is listed as a sync sample.
    pub is_keyframe: bool,
}

/// Receives samples synchronously, in emission order.
///
/// The scheduler does not read the next sample until `consume` returns.
/// Returning an error aborts the drain.
pub trait SampleConsumer {
    fn consume(&mut self, sample: Sample) -> Result<()>;
}

impl<F> SampleConsumer for F
where
    F: FnMut(Sample) -> Result<()>,
{
    fn consume(&mut self, sample: Sample) -> Result<()> {
        self(sample)
    }
}

/// Forwards samples into a bounded channel.
///
/// Must run on a thread that may block (e.g. `spawn_blocking`), since a full
/// channel parks the drain until the receiver catches up.
pub struct ChannelConsumer {
    tx: mpsc::Sender<Sample>,
}

impl ChannelConsumer {
    pub fn new(tx: mpsc::Sender<Sample>) -> Self {
        Self { tx }
    }

    /// Create a consumer and the receiving half of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Sample>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl SampleConsumer for ChannelConsumer {
    fn consume(&mut self, sample: Sample) -> Result<()> {
        self.tx
            .blocking_send(sample)
            .map_err(|_| Error::ConsumerClosed)
    }
}
