//! Stream-based sample source.
//!
//! Receives sample batches from an async byte stream, such as a TCP
//! connection to a probe bridge or the process's stdin.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use super::{parse_batch, AcquisitionError, SampleSource};

/// Buffered batches before the reader task applies backpressure.
const CHANNEL_CAPACITY: usize = 1024;

type BatchResult = Result<Vec<f64>, AcquisitionError>;

/// A sample source that reads newline-delimited batches from an async stream.
///
/// This source spawns a background task that parses each line with
/// [`parse_batch`](super::parse_batch) and makes the results available via
/// `fetch()`. Must be created from within a tokio runtime.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use powerwatch::StreamSource;
///
/// # tokio_test::block_on(async {
/// let data = b"12.0 13.5\n";
/// let stream = Cursor::new(data.to_vec());
/// let source = StreamSource::spawn(stream, "example");
/// # });
/// ```
#[derive(Debug)]
pub struct StreamSource {
    receiver: mpsc::Receiver<BatchResult>,
    description: String,
}

impl StreamSource {
    /// Spawn a background task that reads from the given async reader.
    pub fn spawn<R>(reader: R, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let desc = description.to_string();

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                let item = match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::debug!("Sample stream {} reached EOF", desc);
                        break;
                    }
                    Ok(_) => parse_batch(line.trim()),
                    Err(e) => Err(AcquisitionError::Io(e.to_string())),
                };

                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    // Receiver dropped, or the error has been reported
                    break;
                }
            }
        });

        Self {
            receiver: rx,
            description: format!("stream: {}", description),
        }
    }
}

impl SampleSource for StreamSource {
    fn fetch(&mut self) -> Result<Vec<f64>, AcquisitionError> {
        let mut batch = Vec::new();
        let mut received = false;

        loop {
            match self.receiver.try_recv() {
                Ok(Ok(samples)) => {
                    received = true;
                    batch.extend(samples);
                }
                Ok(Err(e)) => return Err(e),
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
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_stream_source_spawn() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut source = StreamSource::spawn(client, "test");

        server.write_all(b"10 20\n30\n").await.unwrap();
        settle().await;

        assert_eq!(source.fetch().unwrap(), vec![10.0, 20.0, 30.0]);
        assert!(source.fetch().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_source_description() {
        let cursor = Cursor::new("");
        let source = StreamSource::spawn(cursor, "tcp://localhost:9090");
        assert_eq!(source.description(), "stream: tcp://localhost:9090");
    }

    #[tokio::test]
    async fn test_stream_source_eof_disconnects() {
        let cursor = Cursor::new("5.0\n");
        let mut source = StreamSource::spawn(cursor, "test");
        settle().await;

        // Data received before EOF is still delivered
        assert_eq!(source.fetch().unwrap(), vec![5.0]);

        let err = source.fetch().unwrap_err();
        assert!(matches!(err, AcquisitionError::Disconnected(_)));
    }

    #[tokio::test]
    async fn test_stream_source_invalid_line() {
        let cursor = Cursor::new("not valid\n1.0\n");
        let mut source = StreamSource::spawn(cursor, "test");
        settle().await;

        let err = source.fetch().unwrap_err();
        assert!(matches!(err, AcquisitionError::Parse(_)));
    }
}
