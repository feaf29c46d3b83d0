//! Line-oriented view of a UART log.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::UartError;

/// Lines buffered before the reader blocks.
const LINE_BUFFER: usize = 4096;

/// Watches a UART for log lines.
///
/// A blocking task reads the port and forwards complete lines; callers can
/// discard the backlog with [`flush`](Self::flush) and wait for marker lines
/// with [`wait_for_all`](Self::wait_for_all). Dropping the log stops the
/// reader.
pub struct UartLog {
    lines: mpsc::Receiver<String>,
    writer: Option<Box<dyn Write + Send>>,
    stop: Arc<AtomicBool>,
    description: String,
}

impl std::fmt::Debug for UartLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UartLog")
            .field("description", &self.description)
            .field("writable", &self.writer.is_some())
            .finish()
    }
}

impl UartLog {
    /// Start reading lines from `reader` on the blocking thread pool.
    ///
    /// Must be called from within a tokio runtime. `reader` should return
    /// `TimedOut` periodically when idle so the reader can notice a stop.
    pub fn spawn<R>(reader: R, writer: Option<Box<dyn Write + Send>>, description: &str) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let desc = description.to_string();

        tokio::task::spawn_blocking(move || read_lines(reader, tx, stop_flag, &desc));

        Self {
            lines: rx,
            writer,
            stop,
            description: format!("uart: {}", description),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Discard every line received so far. Returns how many were dropped.
    pub fn flush(&mut self) -> usize {
        let mut dropped = 0;
        while self.lines.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Wait until each pattern has appeared in some line, in any order.
    pub async fn wait_for_all<S>(
        &mut self,
        patterns: &[S],
        timeout: Duration,
    ) -> Result<(), UartError>
    where
        S: AsRef<str>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut missing: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();

        while !missing.is_empty() {
            match tokio::time::timeout_at(deadline, self.lines.recv()).await {
                Ok(Some(line)) => {
                    missing.retain(|pattern| {
                        let found = line.contains(pattern.as_str());
                        if found {
                            tracing::info!("Found '{}' on {}", pattern, self.description);
                        }
                        !found
                    });
                }
                Ok(None) => return Err(UartError::Closed { missing }),
                Err(_) => return Err(UartError::Timeout { timeout, missing }),
            }
        }

        Ok(())
    }

    /// Send a command line to the device shell.
    pub fn send_line(&mut self, line: &str) -> Result<(), UartError> {
        let writer = self.writer.as_mut().ok_or(UartError::ReadOnly)?;
        tracing::debug!("Sending '{}' to {}", line, self.description);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\r\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Stop the background reader.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for UartLog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_lines<R: Read>(reader: R, tx: mpsc::Sender<String>, stop: Arc<AtomicBool>, desc: &str) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() {
                    let _ = tx.blocking_send(decode(&buf));
                }
                tracing::debug!("UART {} closed", desc);
                break;
            }
            Ok(_) if buf.last() != Some(&b'\n') => {
                // Partial line at EOF; flushed by the next read
                continue;
            }
            Ok(_) => {
                let line = decode(&buf);
                buf.clear();
                tracing::trace!(target: "uart", "{}", line);
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                // Partial bytes stay in `buf`
                continue;
            }
            Err(e) => {
                tracing::warn!("UART {} read error: {}", desc, e);
                break;
            }
        }
    }
}

fn decode(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::{self, Cursor};

    /// Reader that never produces data, like an idle serial port.
    struct IdlePort;

    impl Read for IdlePort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            Err(io::Error::new(ErrorKind::TimedOut, "idle"))
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn boot_log() -> Cursor<&'static [u8]> {
        Cursor::new(
            b"*** Booting nRF Connect SDK ***\r\n\
              network: Network connectivity established\r\n\
              cloud: Connected to Cloud\r\n"
                .as_slice(),
        )
    }

    #[tokio::test]
    async fn test_wait_for_all_finds_patterns_in_any_order() {
        let mut log = UartLog::spawn(boot_log(), None, "test");

        let patterns = ["Connected to Cloud", "Network connectivity established"];
        log.wait_for_all(&patterns, Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_all_reports_missing_on_close() {
        let mut log = UartLog::spawn(boot_log(), None, "test");

        let err = log
            .wait_for_all(&["Connected to Cloud", "Location search done"], Duration::from_secs(2))
            .await
            .unwrap_err();

        match err {
            UartError::Closed { missing } => assert_eq!(missing, vec!["Location search done"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_all_times_out() {
        let mut log = UartLog::spawn(IdlePort, None, "idle");

        let err = log.wait_for_all(&["never"], Duration::from_millis(50)).await.unwrap_err();

        assert!(matches!(err, UartError::Timeout { ref missing, .. } if missing == &["never"]));
    }

    #[tokio::test]
    async fn test_flush_discards_backlog() {
        let mut log = UartLog::spawn(boot_log(), None, "test");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(log.flush(), 3);
        let err = log.wait_for_all(&["Booting"], Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, UartError::Closed { .. }));
    }

    #[tokio::test]
    async fn test_trailing_partial_line_is_delivered() {
        let mut log = UartLog::spawn(Cursor::new(b"no newline at end".as_slice()), None, "test");
        log.wait_for_all(&["at end"], Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_line() {
        let buffer = SharedBuffer::default();
        let mut log = UartLog::spawn(IdlePort, Some(Box::new(buffer.clone())), "test");

        log.send_line("at AT%XFACTORYRESET=0").unwrap();

        assert_eq!(buffer.0.lock().as_slice(), b"at AT%XFACTORYRESET=0\r\n");
        assert_eq!(log.description(), "uart: test");
    }

    #[tokio::test]
    async fn test_send_line_read_only() {
        let mut log = UartLog::spawn(IdlePort, None, "test");
        assert!(matches!(log.send_line("help"), Err(UartError::ReadOnly)));
    }
}
