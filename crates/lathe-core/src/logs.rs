//! Per-job log files.
//!
//! Each job owns one append-only text file under the log directory, addressed
//! by the job's log reference. Within a process only the job's runner writes
//! to it while the runner is alive; any number of readers may tail it
//! concurrently. Each line goes out as a single append, so lines from another
//! process sharing the log directory never tear.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use lathe_training::{JobError, JobResult};
use tracing::warn;

/// Append-only text store keyed by log reference.
pub trait LogSink: Send + Sync {
    /// Appends exactly one line.
    fn write(&self, reference: &str, line: &str) -> JobResult<()>;

    /// Returns a restartable view of the last `n` lines.
    fn tail(&self, reference: &str, n: usize) -> LogTail;

    /// Appends `[<rfc3339>] <text>`.
    fn append_entry(&self, reference: &str, text: &str) -> JobResult<()> {
        self.write(reference, &format!("[{}] {}", Utc::now().to_rfc3339(), text))
    }
}

/// The last `n` lines of a log file, read afresh on every [`LogTail::iter`].
#[derive(Debug, Clone)]
pub struct LogTail {
    path: PathBuf,
    n: usize,
}

impl LogTail {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, n: usize) -> Self {
        Self { path: path.into(), n }
    }

    /// True once the log file has been created.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads the file and yields at most `n` lines in order.
    ///
    /// A missing or unreadable file yields nothing. Invalid UTF-8 is replaced
    /// rather than ending the read.
    pub fn iter(&self) -> std::collections::vec_deque::IntoIter<String> {
        let mut window = VecDeque::new();
        if self.n == 0 {
            return window.into_iter();
        }
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to open job log");
                }
                return window.into_iter();
            }
        };
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to read job log");
                    break;
                }
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            if window.len() == self.n {
                window.pop_front();
            }
            window.push_back(String::from_utf8_lossy(&buf).into_owned());
        }
        window.into_iter()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.iter().collect()
    }
}

impl IntoIterator for &LogTail {
    type Item = String;
    type IntoIter = std::collections::vec_deque::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// [`LogSink`] backed by one file per job under a root directory.
#[derive(Debug, Clone)]
pub struct FsLogSink {
    logs_dir: PathBuf,
}

impl FsLogSink {
    /// Creates the sink, creating `logs_dir` if needed.
    ///
    /// # Errors
    /// Returns `JobError::Storage` if the directory cannot be created
    pub fn new(logs_dir: impl AsRef<Path>) -> JobResult<Self> {
        let logs_dir = logs_dir.as_ref().to_path_buf();
        fs::create_dir_all(&logs_dir).map_err(|e| {
            JobError::Storage(format!("failed to create log dir {}: {e}", logs_dir.display()))
        })?;
        Ok(Self { logs_dir })
    }

    #[must_use]
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Resolves a reference to a file inside the log directory.
    ///
    /// Only the final path component is used, so a reference can never
    /// point outside the directory.
    #[must_use]
    pub fn log_path(&self, reference: &str) -> PathBuf {
        let name = Path::new(reference)
            .file_name()
            .map_or_else(|| "unnamed.log".into(), std::ffi::OsStr::to_os_string);
        self.logs_dir.join(name)
    }

    /// Removes ANSI color codes and folds embedded line breaks into spaces.
    fn sanitize(text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            match c {
                '\x1B' => {
                    if chars.next() == Some('[') {
                        for next in chars.by_ref() {
                            if next.is_ascii_alphabetic() {
                                break;
                            }
                        }
                    }
                }
                '\r' | '\n' => result.push(' '),
                _ => result.push(c),
            }
        }

        result
    }
}

impl LogSink for FsLogSink {
    fn write(&self, reference: &str, line: &str) -> JobResult<()> {
        let path = self.log_path(reference);
        let mut file = OpenOptions::new().create(true).append(true).open(&path).map_err(|e| {
            JobError::Storage(format!("failed to open log {}: {e}", path.display()))
        })?;
        let mut entry = Self::sanitize(line);
        entry.push('\n');
        file.write_all(entry.as_bytes())
            .map_err(|e| JobError::Storage(format!("failed to write log {}: {e}", path.display())))
    }

    fn tail(&self, reference: &str, n: usize) -> LogTail {
        LogTail::new(self.log_path(reference), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_tail() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path().join("logs")).unwrap();

        for i in 1..=5 {
            sink.write("training_job_1.log", &format!("line {i}")).unwrap();
        }

        let tail = sink.tail("training_job_1.log", 3);
        assert_eq!(tail.lines(), vec!["line 3", "line 4", "line 5"]);

        let all = sink.tail("training_job_1.log", 10);
        assert_eq!(all.lines().len(), 5);
        assert_eq!(all.lines()[0], "line 1");
    }

    #[test]
    fn test_tail_is_restartable() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        let tail = sink.tail("job.log", 2);

        assert_eq!(tail.iter().count(), 0);
        sink.write("job.log", "first").unwrap();
        assert_eq!(tail.lines(), vec!["first"]);
        sink.write("job.log", "second").unwrap();
        sink.write("job.log", "third").unwrap();
        assert_eq!(tail.lines(), vec!["second", "third"]);
        assert_eq!((&tail).into_iter().collect::<Vec<_>>(), vec!["second", "third"]);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        let tail = sink.tail("training_job_404.log", 50);
        assert!(!tail.exists());
        assert!(tail.lines().is_empty());
    }

    #[test]
    fn test_zero_lines() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        sink.write("job.log", "only").unwrap();
        assert!(sink.tail("job.log", 0).lines().is_empty());
    }

    #[test]
    fn test_sanitize_strips_colors_and_newlines() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        sink.write("job.log", "\x1B[31mred\x1B[0m text\nsecond half").unwrap();
        assert_eq!(sink.tail("job.log", 10).lines(), vec!["red text second half"]);
    }

    #[test]
    fn test_append_entry_is_timestamped() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        sink.append_entry("job.log", "Epoch 1/3 completed").unwrap();

        let line = sink.tail("job.log", 1).lines().remove(0);
        assert!(line.starts_with('['));
        assert!(line.ends_with("] Epoch 1/3 completed"));
    }

    #[test]
    fn test_concurrent_writers_keep_lines_whole() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        let per_writer = 2000;

        std::thread::scope(|scope| {
            for w in 0..4 {
                let sink = &sink;
                scope.spawn(move || {
                    for i in 0..per_writer {
                        sink.write("job.log", &format!("writer{w} line{i}")).unwrap();
                    }
                });
            }
        });

        let lines = sink.tail("job.log", usize::MAX).lines();
        assert_eq!(lines.len(), 4 * per_writer);
        for line in &lines {
            let (writer, index) = line.split_once(' ').unwrap();
            assert!(writer.starts_with("writer") && writer[6..].parse::<u32>().is_ok(), "{line}");
            assert!(index.starts_with("line") && index[4..].parse::<u32>().is_ok(), "{line}");
        }
    }

    #[test]
    fn test_invalid_utf8_does_not_hide_later_lines() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        sink.write("job.log", "before").unwrap();
        let mut file = OpenOptions::new().append(true).open(sink.log_path("job.log")).unwrap();
        file.write_all(b"bad \xFF\xFE bytes\n").unwrap();
        sink.write("job.log", "after").unwrap();

        let lines = sink.tail("job.log", 10).lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "before");
        assert!(lines[1].starts_with("bad "));
        assert_eq!(lines[2], "after");
    }

    #[test]
    fn test_log_path_stays_in_dir() {
        let temp = TempDir::new().unwrap();
        let sink = FsLogSink::new(temp.path()).unwrap();
        let path = sink.log_path("../../etc/passwd");
        assert_eq!(path, temp.path().join("passwd"));
    }
}
