//! Input events and the sources that supply them.
//!
//! Events are flat (optionally nested) JSON objects with a numeric
//! `timestamp`. Ingestion itself lives outside the crate; the sources here
//! adapt in-memory queues, tokio channels and line-oriented readers to the
//! [`EventSource`] contract the orchestrator pulls from.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An immutable key/value input record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Wrap an existing JSON map.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build an event from a JSON value. Non-objects are wrapped as `{"raw": value}`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Map::new();
                fields.insert("raw".to_string(), other);
                Self { fields }
            }
        }
    }

    /// Parse one input line. Lines that are not JSON objects become raw events.
    pub fn from_line(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return Self::from_value(value);
            }
        }
        Self::from_value(Value::String(trimmed.to_string()))
    }

    /// The event timestamp, when present and numeric.
    pub fn timestamp(&self) -> Option<f64> {
        self.f64("timestamp")
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Numeric field value.
    pub fn f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
    }

    /// String field value.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Numeric value at a nested path, e.g. `["memory", "used_percent"]`.
    pub fn f64_at(&self, path: &[&str]) -> Option<f64> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(*first)?;
        for key in rest {
            current = current.get(*key)?;
        }
        current.as_f64().filter(|v| v.is_finite())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Value> for Event {
    fn from(value: Value) -> Self {
        Event::from_value(value)
    }
}

// ---------------------------------------------------------------------------
// EventSource
// ---------------------------------------------------------------------------

/// One pull from an [`EventSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    /// The next event.
    Event(Event),
    /// Nothing available right now; the orchestrator backs off and retries.
    Idle,
    /// The stream is finished.
    End,
}

/// A single logical producer of events.
#[async_trait]
pub trait EventSource: Send {
    /// Pull the next item from the source.
    async fn next_event(&mut self) -> SourceItem;
}

/// In-memory source that ends once drained.
#[derive(Debug, Default)]
pub struct VecSource {
    events: VecDeque<Event>,
}

impl VecSource {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

#[async_trait]
impl EventSource for VecSource {
    async fn next_event(&mut self) -> SourceItem {
        match self.events.pop_front() {
            Some(event) => SourceItem::Event(event),
            None => SourceItem::End,
        }
    }
}

/// Source backed by a tokio mpsc channel.
///
/// Reports [`SourceItem::Idle`] while the channel is empty and
/// [`SourceItem::End`] once every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Event>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Create a bounded channel and its source end.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Event>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> SourceItem {
        match self.rx.try_recv() {
            Ok(event) => SourceItem::Event(event),
            Err(mpsc::error::TryRecvError::Empty) => SourceItem::Idle,
            Err(mpsc::error::TryRecvError::Disconnected) => SourceItem::End,
        }
    }
}

/// Source reading one event per line from an async reader.
///
/// In `follow` mode end-of-input is reported as idle, so a reader over a
/// growing file keeps being polled. Blank lines are skipped. Lines that are
/// not valid UTF-8 are decoded lossily and end up as raw events.
pub struct JsonLinesSource<R> {
    reader: R,
    follow: bool,
    line: Vec<u8>,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            follow: false,
            line: Vec::new(),
        }
    }

    /// Keep polling past end-of-input instead of ending.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }
}

#[async_trait]
impl<R> EventSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> SourceItem {
        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line).await {
                Ok(0) => {
                    return if self.follow {
                        SourceItem::Idle
                    } else {
                        SourceItem::End
                    };
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.line);
                    if line.trim().is_empty() {
                        continue;
                    }
                    return SourceItem::Event(Event::from_line(&line));
                }
                Err(e) => {
                    log::warn!("Event source read failed: {}", e);
                    return SourceItem::End;
                }
            }
        }
    }
}
