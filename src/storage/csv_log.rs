//! Flat-file event store
//!
//! Readings and messages go to two CSV files with a header row. This is the
//! format the dashboard and the history view read, see
//! [`schema`](super::schema) for the column contract.
//!
//! ## Durability
//!
//! Every append encodes one complete record, writes it and syncs the file
//! before returning. Both files are only ever appended to. If the process dies
//! in the middle of a write, the file may end in a partial line. A record only
//! counts once its terminating newline is on disk: opening the store for
//! writing truncates the file back to the last newline, and scans ignore an
//! unterminated tail, which may still be in flight from a writer in another
//! process.
//!
//! ## Concurrency
//!
//! All file access of one store goes through a single mutex, held for the
//! duration of one record write or one scan. The blocking file I/O runs on
//! tokio's blocking pool.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, instrument, trace, warn};

use super::backend::{EventStore, HealthStatus};
use super::error::{StorageError, StorageResult};
use super::schema::{MESSAGE_HEADER, MessageRow, READING_HEADER, ReadingRow};
use crate::{NodeId, NodeMessage, SensorReading};

/// One append-only CSV file
struct LogFile {
    path: PathBuf,
    /// `None` when opened read-only
    file: Option<File>,
}

impl LogFile {
    fn open(path: &Path, header: &[&str]) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut log = Self {
            path: path.to_path_buf(),
            file: Some(file),
        };

        if log.discard_partial_line()? == 0 {
            debug!("creating {} with header", path.display());
            log.append(header)?;
        }

        Ok(log)
    }

    /// Another process owns the writes; the file may not exist yet.
    fn open_read_only(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn writer(&mut self) -> StorageResult<&mut File> {
        let path = &self.path;
        self.file.as_mut().ok_or_else(|| {
            StorageError::Csv(format!("{} is opened read-only", path.display()))
        })
    }

    /// Truncate an unterminated tail left by a crash mid-write. Returns the
    /// remaining length.
    fn discard_partial_line(&mut self) -> StorageResult<u64> {
        let path = self.path.clone();
        let file = self.writer()?;

        let len = file.metadata()?.len();
        let committed = committed_len(file, len)?;

        if committed < len {
            warn!(
                "{}: discarding {} bytes of a partial last row",
                path.display(),
                len - committed
            );
            file.set_len(committed)?;
            file.sync_data()?;
        }

        Ok(committed)
    }

    /// Encode one record completely, then write and sync it in one go.
    fn append<I, T>(&mut self, record: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut encoder = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        encoder.write_record(record)?;
        let line = encoder
            .into_inner()
            .map_err(|e| StorageError::Csv(e.to_string()))?;

        let file = self.writer()?;
        let result = file.write_all(&line).and_then(|()| file.sync_data());

        if let Err(e) = result {
            if let Err(repair) = self.discard_partial_line() {
                warn!("{}: failed to repair after write error: {repair}", self.path.display());
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Parse every record after the header, skipping the ones `parse` rejects.
    fn scan<R>(
        &self,
        mut parse: impl FnMut(&csv::StringRecord) -> Option<R>,
    ) -> StorageResult<Vec<R>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if self.file.is_none() && e.kind() == io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let committed = content
            .iter()
            .rposition(|&byte| byte == b'\n')
            .map_or(0, |index| index + 1);
        if committed < content.len() {
            trace!("{}: ignoring unterminated last row", self.path.display());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(&content[..committed]);

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            match record {
                Ok(record) => match parse(&record) {
                    Some(row) => rows.push(row),
                    None => trace!("{}: skipping malformed row {}", self.path.display(), index + 1),
                },
                Err(e) => trace!("{}: skipping unreadable row: {e}", self.path.display()),
            }
        }

        Ok(rows)
    }
}

/// Length of `file` up to and including its last newline.
fn committed_len(file: &mut File, len: u64) -> io::Result<u64> {
    let mut chunk = [0u8; 4096];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(chunk.len() as u64);
        let window = &mut chunk[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(window)?;

        if let Some(index) = window.iter().rposition(|&byte| byte == b'\n') {
            return Ok(start + index as u64 + 1);
        }
        end = start;
    }

    Ok(0)
}

struct CsvLogs {
    readings: LogFile,
    messages: LogFile,
}

/// CSV-backed event store
#[derive(Clone)]
pub struct CsvStore {
    logs: Arc<Mutex<CsvLogs>>,
    readings_path: PathBuf,
    messages_path: PathBuf,
}

impl CsvStore {
    /// Open (or create) the reading and message logs.
    #[instrument(skip_all)]
    pub fn open(
        readings_path: impl AsRef<Path>,
        messages_path: impl AsRef<Path>,
    ) -> StorageResult<Self> {
        let readings_path = readings_path.as_ref().to_path_buf();
        let messages_path = messages_path.as_ref().to_path_buf();

        info!(
            "opening event logs at {} and {}",
            readings_path.display(),
            messages_path.display()
        );

        let logs = CsvLogs {
            readings: LogFile::open(&readings_path, &READING_HEADER)?,
            messages: LogFile::open(&messages_path, &MESSAGE_HEADER)?,
        };

        Ok(Self::from_logs(logs, readings_path, messages_path))
    }

    /// Open the logs for reading only, for a process that watches the files
    /// another process appends to. Missing files read as empty.
    pub fn open_read_only(readings_path: impl AsRef<Path>, messages_path: impl AsRef<Path>) -> Self {
        let readings_path = readings_path.as_ref().to_path_buf();
        let messages_path = messages_path.as_ref().to_path_buf();

        let logs = CsvLogs {
            readings: LogFile::open_read_only(&readings_path),
            messages: LogFile::open_read_only(&messages_path),
        };

        Self::from_logs(logs, readings_path, messages_path)
    }

    fn from_logs(logs: CsvLogs, readings_path: PathBuf, messages_path: PathBuf) -> Self {
        Self {
            logs: Arc::new(Mutex::new(logs)),
            readings_path,
            messages_path,
        }
    }

    /// Run `f` with exclusive access to both logs on the blocking pool.
    async fn with_logs<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut CsvLogs) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let logs = Arc::clone(&self.logs);
        tokio::task::spawn_blocking(move || {
            let mut guard = logs
                .lock()
                .map_err(|_| StorageError::TaskFailed("event log lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl EventStore for CsvStore {
    #[instrument(skip_all, fields(node_id = reading.node_id))]
    async fn append_reading(&self, reading: &SensorReading) -> StorageResult<()> {
        let row = ReadingRow::from_reading(reading);
        self.with_logs(move |logs| logs.readings.append(row.to_columns()))
            .await
    }

    #[instrument(skip_all, fields(node_id = message.node_id))]
    async fn append_message(&self, message: &NodeMessage) -> StorageResult<()> {
        let row = MessageRow::from_message(message);
        self.with_logs(move |logs| logs.messages.append(row.to_columns()))
            .await
    }

    async fn readings(&self) -> StorageResult<Vec<ReadingRow>> {
        self.with_logs(|logs| {
            logs.readings
                .scan(|record| ReadingRow::from_columns(record.iter()))
        })
        .await
    }

    async fn messages_for_node(&self, node_id: NodeId) -> StorageResult<Vec<MessageRow>> {
        let messages = self
            .with_logs(|logs| {
                logs.messages
                    .scan(|record| MessageRow::from_columns(record.iter()))
            })
            .await?;

        Ok(messages
            .into_iter()
            .filter(|row| row.node_id == node_id)
            .collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let readings_path = self.readings_path.clone();
        let messages_path = self.messages_path.clone();

        let sizes = tokio::task::spawn_blocking(move || {
            Ok::<_, std::io::Error>((
                std::fs::metadata(&readings_path)?.len(),
                std::fs::metadata(&messages_path)?.len(),
            ))
        })
        .await?;

        let (readings_size, messages_size) = match sizes {
            Ok(sizes) => sizes,
            Err(e) => {
                warn!("health check failed: {}", e);
                return Ok(HealthStatus {
                    healthy: false,
                    message: format!("event logs not accessible: {}", e),
                    metadata: HashMap::from([("backend".to_string(), "csv".to_string())]),
                });
            }
        };

        Ok(HealthStatus {
            healthy: true,
            message: "CSV event logs operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "csv".to_string()),
                (
                    "readings_path".to_string(),
                    self.readings_path.display().to_string(),
                ),
                ("readings_bytes".to_string(), readings_size.to_string()),
                ("messages_bytes".to_string(), messages_size.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing CSV event logs");
        self.with_logs(|logs| {
            for file in [&logs.readings.file, &logs.messages.file].into_iter().flatten() {
                file.sync_all()?;
            }
            Ok(())
        })
        .await
    }
}
