use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::session::now_utc_iso;

pub type EventPayload = Map<String, Value>;

/// Everything the workspace records in `events.jsonl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStarted,
    ImageImported,
    ImageImportFailed,
    GenerationStarted,
    GenerationFinished,
    GenerationFailed,
    HistoryMoved,
    ImageExported,
    SessionFinished,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::SessionStarted,
        EventKind::ImageImported,
        EventKind::ImageImportFailed,
        EventKind::GenerationStarted,
        EventKind::GenerationFinished,
        EventKind::GenerationFailed,
        EventKind::HistoryMoved,
        EventKind::ImageExported,
        EventKind::SessionFinished,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::ImageImported => "image_imported",
            EventKind::ImageImportFailed => "image_import_failed",
            EventKind::GenerationStarted => "generation_started",
            EventKind::GenerationFinished => "generation_finished",
            EventKind::GenerationFailed => "generation_failed",
            EventKind::HistoryMoved => "history_moved",
            EventKind::ImageExported => "image_exported",
            EventKind::SessionFinished => "session_finished",
        }
    }
}

/// Session event log. Clones write to the same file and share one counter.
///
/// Each line is `{"type", "session_id", "ts", ..payload}`; payload keys are
/// merged last.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: Arc<PathBuf>,
    session_id: Arc<str>,
    written: Arc<Mutex<u64>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        let session_id: String = session_id.into();
        Self {
            path: Arc::new(path.into()),
            session_id: Arc::from(session_id),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Lines successfully appended through this writer or its clones.
    pub fn written(&self) -> u64 {
        self.written.lock().map(|count| *count).unwrap_or(0)
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(kind.as_str()));
        event.insert("session_id".to_string(), Value::from(self.session_id()));
        event.insert("ts".to_string(), Value::from(now_utc_iso()));
        event.extend(payload);

        let line = serde_json::to_string(&event)?;
        let mut written = self
            .written
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        self.append_line(&line)
            .with_context(|| format!("failed to append {} to {}", kind.as_str(), self.path.display()))?;
        *written += 1;
        Ok(Value::Object(event))
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventKind, EventPayload, EventWriter};

    fn payload(value: Value) -> EventPayload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn event_kinds_have_distinct_snake_case_tags() {
        let tags = EventKind::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(tags.len(), EventKind::ALL.len());
        assert!(tags
            .iter()
            .all(|tag| tag.chars().all(|ch| ch.is_ascii_lowercase() || ch == '_')));
    }

    #[test]
    fn import_event_carries_session_and_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session").join("events.jsonl");
        let writer = EventWriter::new(&path, "studio-7");

        let emitted = writer.emit(
            EventKind::ImageImported,
            payload(json!({"role": "scene", "source": "url"})),
        )?;

        let content = fs::read_to_string(&path)?;
        let parsed: Value = serde_json::from_str(content.trim_end())?;
        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], json!("image_imported"));
        assert_eq!(parsed["session_id"], json!("studio-7"));
        assert_eq!(parsed["source"], json!("url"));
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or_default())?;
        Ok(())
    }

    #[test]
    fn clones_append_to_one_log_and_share_the_count() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "s");
        let other = writer.clone();

        writer.emit(EventKind::GenerationStarted, EventPayload::new())?;
        other.emit(EventKind::GenerationFailed, payload(json!({"error_kind": "busy"})))?;

        let content = fs::read_to_string(writer.path())?;
        let types = content
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).map(|event| event["type"].clone()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(types, vec![json!("generation_started"), json!("generation_failed")]);
        assert_eq!(writer.written(), 2);
        Ok(())
    }

    #[test]
    fn unwritable_log_reports_path_and_keeps_count() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        fs::create_dir(&path)?;
        let writer = EventWriter::new(&path, "s");

        let err = writer
            .emit(EventKind::HistoryMoved, EventPayload::new())
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(err.contains("history_moved"));
        assert!(err.contains("events.jsonl"));
        assert_eq!(writer.written(), 0);
        Ok(())
    }
}
