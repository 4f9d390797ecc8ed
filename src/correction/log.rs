//! Durable append-only correction log.
//!
//! Durability works like a write-ahead log without segments:
//! 1. Every confirmed correction is appended as one checksummed line
//! 2. Appends optionally `fsync` before the in-memory map changes
//! 3. On startup the log is replayed in file order
//!
//! A crash mid-append leaves a torn final line. Replay skips it and `open`
//! terminates it so the next append starts on a fresh line. An append that
//! fails in a running process is rolled back by truncating the file to its
//! previous length; if even that fails, the next append terminates the
//! partial line first.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::error::CorrectionLogError;

use super::codec::{self, LogRecord};
use super::file_lock::FileLock;

/// Records recovered from a log file.
#[derive(Debug, Default)]
pub struct Replay {
    /// Valid records in file order.
    pub records: Vec<LogRecord>,
    /// Lines that were blank, torn, corrupt or otherwise undecodable.
    pub skipped: usize,
}

/// Append-only correction log.
///
/// Thread-safe via an internal mutex; each append is a single `write_all` on
/// an append-mode handle.
#[derive(Debug)]
pub struct CorrectionLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync_on_write: bool,
    _lock: FileLock,
}

#[derive(Debug)]
struct LogWriter {
    file: File,
    /// The file may end in a partial line left by a failed append.
    torn: bool,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl LogWriter {
    fn new(file: File) -> Self {
        Self {
            file,
            torn: false,
            #[cfg(test)]
            fail_after: None,
        }
    }

    fn append(&mut self, line: &[u8], sync: bool) -> std::io::Result<()> {
        if self.torn {
            self.file.write_all(b"\n")?;
            self.torn = false;
        }
        let start = self.file.metadata()?.len();
        let result = self.write_line(line).and_then(|()| {
            if sync {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });
        if result.is_err() {
            if let Err(e) = self.file.set_len(start) {
                warn!(error = %e, "could not roll back failed correction log append");
                self.torn = true;
            }
        }
        result
    }

    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.fail_after.take() {
            self.file.write_all(&line[..n.min(line.len())])?;
            return Err(std::io::Error::other("injected write failure"));
        }
        self.file.write_all(line)
    }
}

impl CorrectionLog {
    /// Opens or creates the log at `path` and replays it.
    ///
    /// # Errors
    /// - `Locked` if another process owns the log
    /// - `Io` if the file cannot be created, read or repaired
    pub fn open(path: &Path, sync_on_write: bool) -> Result<(Self, Replay), CorrectionLogError> {
        let io_err = |source| CorrectionLogError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let lock = FileLock::acquire(&lock_path_for(path)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                CorrectionLogError::Locked {
                    path: path.to_path_buf(),
                }
            } else {
                io_err(e)
            }
        })?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(io_err)?;

        let replay = Self::read_all(&mut file).map_err(io_err)?;
        Self::repair_torn_tail(&mut file, sync_on_write).map_err(io_err)?;

        Ok((
            Self {
                path: path.to_path_buf(),
                writer: Mutex::new(LogWriter::new(file)),
                sync_on_write,
                _lock: lock,
            },
            replay,
        ))
    }

    /// Appends one record.
    ///
    /// # Errors
    /// Returns `Io` if the write (or `fsync`) fails.
    pub fn append(&self, record: &LogRecord) -> Result<(), CorrectionLogError> {
        let line = codec::encode_line(record).map_err(|e| CorrectionLogError::Encode {
            message: e.to_string(),
        })?;

        let mut writer = self.writer.lock().map_err(|_| CorrectionLogError::Poisoned {
            context: "log.append",
        })?;
        writer
            .append(&line, self.sync_on_write)
            .map_err(|e| self.io_err(e))
    }

    /// Replaces the log contents with `records`.
    ///
    /// The new contents are written to a sibling file, synced, then renamed
    /// over the log, so a crash leaves either the old or the new log intact.
    ///
    /// # Errors
    /// Returns `Io` if writing or renaming fails; the old log is kept.
    pub fn rewrite(&self, records: &[LogRecord]) -> Result<(), CorrectionLogError> {
        let mut writer = self.writer.lock().map_err(|_| CorrectionLogError::Poisoned {
            context: "log.rewrite",
        })?;

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = File::create(&tmp_path).map_err(|e| self.io_err(e))?;
            for record in records {
                let line = codec::encode_line(record).map_err(|e| CorrectionLogError::Encode {
                    message: e.to_string(),
                })?;
                tmp.write_all(&line).map_err(|e| self.io_err(e))?;
            }
            tmp.sync_all().map_err(|e| self.io_err(e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))?;

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        *writer = LogWriter::new(file);
        Ok(())
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    /// Returns `Io` if the file metadata cannot be read.
    pub fn size_bytes(&self) -> Result<u64, CorrectionLogError> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: std::io::Error) -> CorrectionLogError {
        CorrectionLogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_all(file: &mut File) -> std::io::Result<Replay> {
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&*file);
        let mut replay = Replay::default();
        let mut buf = Vec::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                warn!(line = line_no, "skipping correction log line: invalid UTF-8");
                replay.skipped += 1;
                continue;
            };
            match codec::decode_line(line) {
                Ok(record) => replay.records.push(record),
                Err(codec::DecodeError::Blank) => {}
                Err(e) => {
                    warn!(line = line_no, error = %e, "skipping malformed correction log line");
                    replay.skipped += 1;
                }
            }
        }

        Ok(replay)
    }

    fn repair_torn_tail(file: &mut File, sync_on_write: bool) -> std::io::Result<()> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!("correction log ends with a torn entry; terminating it");
            file.write_all(b"\n")?;
            if sync_on_write {
                file.sync_data()?;
            }
        }
        Ok(())
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
