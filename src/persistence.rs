//! Document storage and the single background writer.
//!
//! Two JSON documents (config and world) plus the append-only audit logs.
//! All writes go through [`PersistenceWriter`], one thread fed by a channel,
//! so writes never interleave and callers never block on disk. A crash between
//! an in-memory change and its queued write loses that change.

use crate::audit::{tail, AuditEntry, AuditLog};
use crate::config::GymConfigFile;
use crate::errors::{PersistenceError, PersistenceResult};
use crate::ledger::WorldDataFile;
use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "gym_settings.json";
pub const WORLD_FILE_NAME: &str = "gym_data.json";

/// Where documents live. Loads return `Ok(None)` when nothing was saved yet.
pub trait DocumentStore: Send + Sync {
    fn load_config(&self) -> PersistenceResult<Option<GymConfigFile>>;
    fn save_config(&self, doc: &GymConfigFile) -> PersistenceResult<()>;
    fn load_world(&self) -> PersistenceResult<Option<WorldDataFile>>;
    fn save_world(&self, doc: &WorldDataFile) -> PersistenceResult<()>;
    fn append_audit(&self, entry: &AuditEntry) -> PersistenceResult<()>;
    /// Last `n` lines of an audit log, oldest first.
    fn audit_tail(&self, log: AuditLog, n: usize) -> PersistenceResult<Vec<String>>;
}

// --- JSON files on disk ---

/// Config file, world file and `logs/` under one data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    config_path: PathBuf,
    world_path: PathBuf,
    log_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        JsonFileStore {
            config_path: dir.join(CONFIG_FILE_NAME),
            world_path: dir.join(WORLD_FILE_NAME),
            log_dir: dir.join("logs"),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn world_path(&self) -> &Path {
        &self.world_path
    }

    fn log_path(&self, log: AuditLog) -> PathBuf {
        match log {
            AuditLog::LeaderHistory => self.log_dir.join("leader_history.log"),
            AuditLog::Battles(month) => self.log_dir.join("battles").join(format!("{}.log", month)),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> PersistenceResult<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path)(err)),
    };

    match serde_json::from_str(&raw) {
        Ok(doc) => Ok(Some(doc)),
        Err(source) => {
            let aside = path.with_extension("json.bad");
            if let Err(err) = fs::rename(path, &aside) {
                warn!(path = %path.display(), error = %err, "Could not move unreadable document aside");
            }
            Err(PersistenceError::Parse {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// Write to a sibling temp file, then rename over the target.
fn write_json<T: Serialize>(path: &Path, doc: &T) -> PersistenceResult<()> {
    let json = serde_json::to_string_pretty(doc)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))
}

impl DocumentStore for JsonFileStore {
    fn load_config(&self) -> PersistenceResult<Option<GymConfigFile>> {
        read_json(&self.config_path)
    }

    fn save_config(&self, doc: &GymConfigFile) -> PersistenceResult<()> {
        write_json(&self.config_path, doc)
    }

    fn load_world(&self) -> PersistenceResult<Option<WorldDataFile>> {
        read_json(&self.world_path)
    }

    fn save_world(&self, doc: &WorldDataFile) -> PersistenceResult<()> {
        write_json(&self.world_path, doc)
    }

    fn append_audit(&self, entry: &AuditEntry) -> PersistenceResult<()> {
        let path = self.log_path(entry.log);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;
        for line in &entry.lines {
            writeln!(file, "{}", line).map_err(io_error(&path))?;
        }
        Ok(())
    }

    fn audit_tail(&self, log: AuditLog, n: usize) -> PersistenceResult<Vec<String>> {
        let path = self.log_path(log);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(tail(&text, n)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(io_error(&path)(err)),
        }
    }
}

// --- In memory ---

#[derive(Debug, Default)]
struct MemoryDocs {
    config: Option<String>,
    world: Option<String>,
    leader_history: Vec<String>,
    battles: HashMap<String, Vec<String>>,
}

/// Keeps serialized documents in memory. Clones share the same documents, so
/// a test can hand one clone to the writer and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<MemoryDocs>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_json(&self) -> Option<String> {
        self.docs.lock().config.clone()
    }

    pub fn world_json(&self) -> Option<String> {
        self.docs.lock().world.clone()
    }

    /// Replace the stored config text verbatim.
    pub fn put_config_json(&self, json: impl Into<String>) {
        self.docs.lock().config = Some(json.into());
    }

    pub fn put_world_json(&self, json: impl Into<String>) {
        self.docs.lock().world = Some(json.into());
    }

    pub fn audit_lines(&self, log: AuditLog) -> Vec<String> {
        let docs = self.docs.lock();
        match log {
            AuditLog::LeaderHistory => docs.leader_history.clone(),
            AuditLog::Battles(month) => docs
                .battles
                .get(&month.to_string())
                .cloned()
                .unwrap_or_default(),
        }
    }
}

fn parse_memory<T: DeserializeOwned>(raw: Option<String>, name: &str) -> PersistenceResult<Option<T>> {
    raw.map(|raw| {
        serde_json::from_str(&raw).map_err(|source| PersistenceError::Parse {
            path: PathBuf::from(name),
            source,
        })
    })
    .transpose()
}

impl DocumentStore for MemoryStore {
    fn load_config(&self) -> PersistenceResult<Option<GymConfigFile>> {
        parse_memory(self.config_json(), CONFIG_FILE_NAME)
    }

    fn save_config(&self, doc: &GymConfigFile) -> PersistenceResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        self.put_config_json(json);
        Ok(())
    }

    fn load_world(&self) -> PersistenceResult<Option<WorldDataFile>> {
        parse_memory(self.world_json(), WORLD_FILE_NAME)
    }

    fn save_world(&self, doc: &WorldDataFile) -> PersistenceResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        self.put_world_json(json);
        Ok(())
    }

    fn append_audit(&self, entry: &AuditEntry) -> PersistenceResult<()> {
        let mut docs = self.docs.lock();
        let target = match entry.log {
            AuditLog::LeaderHistory => &mut docs.leader_history,
            AuditLog::Battles(month) => docs.battles.entry(month.to_string()).or_default(),
        };
        target.extend(entry.lines.iter().cloned());
        Ok(())
    }

    fn audit_tail(&self, log: AuditLog, n: usize) -> PersistenceResult<Vec<String>> {
        let lines = self.audit_lines(log);
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].to_vec())
    }
}

// --- Background writer ---

enum WriteRequest {
    SaveConfig(GymConfigFile),
    SaveWorld(WorldDataFile),
    AppendAudit(AuditEntry),
    Flush(Sender<()>),
    Shutdown,
}

/// Serializes every write onto one thread.
pub struct PersistenceWriter {
    sender: Sender<WriteRequest>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PersistenceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWriter").finish_non_exhaustive()
    }
}

impl PersistenceWriter {
    pub fn spawn(store: Arc<dyn DocumentStore>) -> PersistenceResult<Self> {
        let (sender, receiver) = unbounded::<WriteRequest>();
        let handle = thread::Builder::new()
            .name("gym-persistence".to_string())
            .spawn(move || {
                for request in receiver.iter() {
                    let result = match request {
                        WriteRequest::SaveConfig(doc) => store.save_config(&doc),
                        WriteRequest::SaveWorld(doc) => store.save_world(&doc),
                        WriteRequest::AppendAudit(entry) => store.append_audit(&entry),
                        WriteRequest::Flush(reply) => {
                            let _ = reply.send(());
                            Ok(())
                        }
                        WriteRequest::Shutdown => break,
                    };
                    if let Err(err) = result {
                        warn!(error = %err, "Persistence write failed");
                    }
                }
                debug!("Persistence writer stopped");
            })
            .map_err(|source| PersistenceError::Io {
                path: PathBuf::from("gym-persistence"),
                source,
            })?;

        Ok(PersistenceWriter {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn save_config(&self, doc: GymConfigFile) {
        self.send(WriteRequest::SaveConfig(doc));
    }

    pub fn save_world(&self, doc: WorldDataFile) {
        self.send(WriteRequest::SaveWorld(doc));
    }

    pub fn append_audit(&self, entry: AuditEntry) {
        self.send(WriteRequest::AppendAudit(entry));
    }

    /// Block until every write queued before this call has been applied.
    pub fn flush(&self) -> PersistenceResult<()> {
        let (reply, done) = bounded(1);
        self.sender
            .send(WriteRequest::Flush(reply))
            .map_err(|_| PersistenceError::WriterClosed)?;
        done.recv().map_err(|_| PersistenceError::WriterClosed)
    }

    /// Apply queued writes and stop the thread. Later writes are dropped with a warning.
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.sender.send(WriteRequest::Shutdown);
        if handle.join().is_err() {
            warn!("Persistence writer panicked");
        }
    }

    fn send(&self, request: WriteRequest) {
        if self.sender.send(request).is_err() {
            warn!("Persistence writer is closed; write dropped");
        }
    }
}

impl Drop for PersistenceWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
