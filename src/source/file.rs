//! File-based sample source.
//!
//! Replays a recorded capture, one line per poll.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use super::{parse_batch, AcquisitionError, SampleSource};

/// A sample source that replays a capture file.
///
/// Each line of the file is one batch, returned by one `fetch` call. Blank
/// lines and lines starting with `#` replay as empty polls. Once the file is
/// exhausted every further fetch returns an empty batch, as a quiet probe
/// would.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
    /// Lines not yet replayed; `None` until the file is first read
    pending: Option<VecDeque<String>>,
}

impl FileSource {
    /// Create a new file source for the given path.
    ///
    /// The file is read lazily on the first fetch.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            pending: None,
        }
    }

    /// Returns the path being replayed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<VecDeque<String>, AcquisitionError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| AcquisitionError::Io(format!("{}: {}", self.path.display(), e)))?;
        Ok(content.lines().map(str::to_owned).collect())
    }
}

impl SampleSource for FileSource {
    fn fetch(&mut self) -> Result<Vec<f64>, AcquisitionError> {
        if self.pending.is_none() {
            self.pending = Some(self.load()?);
        }

        let Some(line) = self.pending.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(Vec::new());
        };

        if line.trim_start().starts_with('#') {
            return Ok(Vec::new());
        }
        parse_batch(&line)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_source_new() {
        let source = FileSource::new("/tmp/capture.txt");
        assert_eq!(source.path(), Path::new("/tmp/capture.txt"));
        assert_eq!(source.description(), "file: /tmp/capture.txt");
    }

    #[test]
    fn test_file_source_replays_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# ppk2 capture").unwrap();
        writeln!(file, "100 120").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "8.5,9.5").unwrap();

        let mut source = FileSource::new(file.path());

        assert!(source.fetch().unwrap().is_empty());
        assert_eq!(source.fetch().unwrap(), vec![100.0, 120.0]);
        assert!(source.fetch().unwrap().is_empty());
        assert_eq!(source.fetch().unwrap(), vec![8.5, 9.5]);

        // Exhausted captures behave like a quiet probe
        assert!(source.fetch().unwrap().is_empty());
    }

    #[test]
    fn test_file_source_missing_file() {
        let mut source = FileSource::new("/nonexistent/path/capture.txt");

        let err = source.fetch().unwrap_err();
        assert!(matches!(err, AcquisitionError::Io(_)));
        assert!(err.to_string().contains("Read error"));
    }

    #[test]
    fn test_file_source_invalid_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not samples").unwrap();

        let mut source = FileSource::new(file.path());

        let err = source.fetch().unwrap_err();
        assert!(err.to_string().contains("Parse error"));
    }
}
