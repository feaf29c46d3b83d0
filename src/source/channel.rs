//! Channel-based sample source.
//!
//! Receives sample batches via a tokio unbounded channel. Useful when the
//! probe is driven in-process and pushes batches rather than being polled.

use tokio::sync::mpsc;

use super::{AcquisitionError, SampleSource};

/// A sample source fed through a channel.
///
/// Every batch pushed since the last `fetch` is concatenated into one
/// batch, so a single poll still yields a single poll average.
///
/// # Example
///
/// ```
/// use powerwatch::ChannelSource;
///
/// let (tx, source) = ChannelSource::create("ppk2");
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::UnboundedReceiver<Vec<f64>>,
    description: String,
}

impl ChannelSource {
    /// Create a new channel source from an existing receiver.
    pub fn new(receiver: mpsc::UnboundedReceiver<Vec<f64>>, source_description: &str) -> Self {
        Self {
            receiver,
            description: format!("channel: {}", source_description),
        }
    }

    /// Create a channel pair.
    ///
    /// Returns (sender, source); dropping the sender disconnects the source
    /// once the buffered batches have been fetched.
    pub fn create(source_description: &str) -> (mpsc::UnboundedSender<Vec<f64>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx, source_description))
    }
}

impl SampleSource for ChannelSource {
    fn fetch(&mut self) -> Result<Vec<f64>, AcquisitionError> {
        let mut batch = Vec::new();
        let mut received = false;

        loop {
            match self.receiver.try_recv() {
                Ok(samples) => {
                    received = true;
                    batch.extend(samples);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if received {
                        break;
                    }
                    return Err(AcquisitionError::Disconnected(self.description.clone()));
                }
            }
        }

        Ok(batch)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_source_empty_poll() {
        let (_tx, mut source) = ChannelSource::create("test");
        assert!(source.fetch().unwrap().is_empty());
        assert_eq!(source.description(), "channel: test");
    }

    #[test]
    fn test_channel_source_concatenates_pending_batches() {
        let (tx, mut source) = ChannelSource::create("test");
        tx.send(vec![1.0, 2.0]).unwrap();
        tx.send(vec![3.0]).unwrap();

        assert_eq!(source.fetch().unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(source.fetch().unwrap().is_empty());
    }

    #[test]
    fn test_channel_source_disconnect_after_drain() {
        let (tx, mut source) = ChannelSource::create("test");
        tx.send(vec![5.0]).unwrap();
        drop(tx);

        // Buffered data is still delivered
        assert_eq!(source.fetch().unwrap(), vec![5.0]);

        let err = source.fetch().unwrap_err();
        assert!(matches!(err, AcquisitionError::Disconnected(_)));
    }
}
