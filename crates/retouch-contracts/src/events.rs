use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::artifact::ImageArtifact;

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL journal of studio activity.
///
/// Every line carries `type`, `studio_id`, `seq` and `ts`, followed by the
/// caller's payload. Reserved keys in the payload are ignored. Artifacts
/// are described through [`artifact_fields`]; image bytes never reach the
/// journal.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Journal>,
}

#[derive(Debug)]
struct Journal {
    path: PathBuf,
    studio_id: String,
    state: Mutex<JournalState>,
}

#[derive(Debug, Default)]
struct JournalState {
    next_seq: u64,
    sink: Option<BufWriter<File>>,
}

const RESERVED_KEYS: [&str; 4] = ["type", "studio_id", "seq", "ts"];

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, studio_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Journal {
                path: path.into(),
                studio_id: studio_id.into(),
                state: Mutex::new(JournalState::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn studio_id(&self) -> &str {
        &self.shared.studio_id
    }

    /// Appends one event and returns the line as written. `payload` must
    /// serialize to a JSON object (or null for no extra fields).
    pub fn emit(&self, event_type: &str, payload: impl Serialize) -> Result<Value> {
        let fields = match serde_json::to_value(payload)? {
            Value::Object(fields) => fields,
            Value::Null => EventPayload::new(),
            other => return Err(anyhow!("event payload for {event_type} is not an object: {other}")),
        };

        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| anyhow!("event journal lock poisoned"))?;

        let mut event = EventPayload::new();
        event.insert("type".to_string(), Value::from(event_type));
        event.insert("studio_id".to_string(), Value::from(self.shared.studio_id.as_str()));
        event.insert("seq".to_string(), Value::from(state.next_seq));
        event.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        for (key, value) in fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                event.insert(key, value);
            }
        }
        let event = Value::Object(event);

        if state.sink.is_none() {
            state.sink = Some(self.open_sink()?);
        }
        if let Some(sink) = state.sink.as_mut() {
            serde_json::to_writer(&mut *sink, &event)?;
            sink.write_all(b"\n")?;
            sink.flush()
                .with_context(|| format!("failed writing {}", self.shared.path.display()))?;
        }
        state.next_seq += 1;
        Ok(event)
    }

    fn open_sink(&self) -> Result<BufWriter<File>> {
        let path = &self.shared.path;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed opening event journal {}", path.display()))?;
        Ok(BufWriter::new(file))
    }
}

/// Digest, size and media type of `artifact`, for embedding in payloads.
pub fn artifact_fields(artifact: &ImageArtifact) -> EventPayload {
    let mut fields = EventPayload::new();
    fields.insert("digest".to_string(), Value::from(artifact.digest()));
    fields.insert("bytes".to_string(), Value::from(artifact.len()));
    fields.insert("media_type".to_string(), Value::from(artifact.media_type()));
    fields
}

/// Reads a journal back, skipping blank lines.
pub fn read_events(path: &Path) -> Result<Vec<Value>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid event on line {} of {}", idx + 1, path.display()))
        })
        .collect()
}
