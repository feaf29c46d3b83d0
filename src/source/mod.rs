//! Sample source abstraction for receiving current measurements.
//!
//! This module provides a trait-based abstraction over where current samples
//! come from (a probe bridge streaming over TCP or stdin, a recorded capture
//! file, or an in-process channel). The settle monitor only ever asks a
//! source for "whatever has arrived since the last call"; starting and
//! stopping the underlying probe is the caller's job.

mod channel;
mod file;
mod stream;

pub use channel::ChannelSource;
pub use file::FileSource;
pub use stream::StreamSource;

use std::fmt::Debug;

use thiserror::Error;

/// Errors raised while acquiring samples.
///
/// Any of these abandons a measurement run as inconclusive rather than
/// failing the device under test.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquisitionError {
    /// Reading from the underlying device or file failed.
    #[error("Read error: {0}")]
    Io(String),

    /// A batch could not be parsed as numeric samples.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The producer went away.
    #[error("Source disconnected: {0}")]
    Disconnected(String),
}

/// Trait for receiving current samples from various sources.
///
/// # Example
///
/// ```
/// use powerwatch::{ChannelSource, SampleSource};
///
/// let (tx, mut source) = ChannelSource::create("example");
/// tx.send(vec![12.0, 14.0]).unwrap();
///
/// let batch = source.fetch().unwrap();
/// assert_eq!(batch, vec![12.0, 14.0]);
/// ```
pub trait SampleSource: Send + Debug {
    /// Fetch all samples (µA) that arrived since the previous call.
    ///
    /// Returns an empty batch if nothing new is available. This method
    /// must not block waiting for data.
    fn fetch(&mut self) -> Result<Vec<f64>, AcquisitionError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn fetch(&mut self) -> Result<Vec<f64>, AcquisitionError> {
        (**self).fetch()
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Parse one line of samples.
///
/// Values may be separated by whitespace, commas or semicolons. A blank
/// line is an empty batch.
pub fn parse_batch(line: &str) -> Result<Vec<f64>, AcquisitionError> {
    line.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let value: f64 = token
                .parse()
                .map_err(|e| AcquisitionError::Parse(format!("'{}': {}", token, e)))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(AcquisitionError::Parse(format!("'{}' is not a finite sample", token)))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_separators() {
        assert_eq!(parse_batch("1 2.5\t3").unwrap(), vec![1.0, 2.5, 3.0]);
        assert_eq!(parse_batch("1,2;3").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(parse_batch(" 4.0 , 5.0 ").unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_parse_batch_blank_is_empty() {
        assert!(parse_batch("").unwrap().is_empty());
        assert!(parse_batch("   \r").unwrap().is_empty());
    }

    #[test]
    fn test_parse_batch_rejects_non_numeric() {
        let err = parse_batch("12 abc").unwrap_err();
        assert!(matches!(err, AcquisitionError::Parse(_)));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_parse_batch_rejects_non_finite() {
        assert!(parse_batch("inf").is_err());
        assert!(parse_batch("NaN").is_err());
    }
}
