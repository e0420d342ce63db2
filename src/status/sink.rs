// src/status/sink.rs

//! Persistence hook.
//!
//! The engine performs no durable writes itself. Every transition is offered
//! to an optional [`TransitionSink`]; an external store decides what to keep.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::Result;

use super::StatusEvent;

/// Flat record of one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
    pub entity_id: String,
    /// `"job"` or `"chain"`.
    pub kind: String,
    pub state: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_summary: Option<String>,
}

impl From<&StatusEvent> for TransitionRecord {
    fn from(event: &StatusEvent) -> Self {
        Self {
            entity_id: event.entity.to_string(),
            kind: event.entity.kind().to_string(),
            state: event.state.to_string(),
            timestamp: event.at,
            payload_summary: event.detail.summary(),
        }
    }
}

/// Receiver of transition records.
///
/// A failing sink is logged by the runtime and never stops the engine.
pub trait TransitionSink: Send {
    fn offer(&mut self, record: &TransitionRecord) -> Result<()>;
}

/// Keeps every record in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TransitionRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl TransitionSink for MemorySink {
    fn offer(&mut self, record: &TransitionRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TransitionSink for JsonLinesSink<W> {
    fn offer(&mut self, record: &TransitionRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(anyhow::Error::from)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}
