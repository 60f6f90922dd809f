//! The response tree and its assembly from concurrent results.
//!
//! A [`Response`] mirrors the selection tree: one [`ResponseField`] per
//! selected field, in selection order, each holding a value or `null` plus
//! a [`FieldError`]. It serialises to the familiar shape:
//!
//! ```json
//! {"data": {"charCount": {"string": "hi", "count": 2}},
//!  "errors": [{"message": "...", "path": ["slow"], "extensions": {"code": "TIMEOUT"}}]}
//! ```
//!
//! `errors` is omitted when empty. Preamble headers from resolvers appear
//! under `extensions.headers`.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use graphqld_resolvers::{ErrorKind, ResolverError, ResponseMetadata};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use strum::Display;

/// Lifecycle of one field within a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldPhase {
    /// The field has been matched to a resolver or a parent property.
    Planned,
    /// A resolver process has been requested.
    Dispatched,
    /// The field holds a value.
    Completed,
    /// The field failed; its value is `null`.
    Failed,
    /// The field ran out of time; its value is `null`.
    TimedOut,
}

impl FieldPhase {
    /// Whether the phase is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// One step in a response path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Response key of a field.
    Key(String),
    /// Position within a list.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A failure attached to one field position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Position of the failed field.
    pub path: Vec<PathSegment>,
}

impl FieldError {
    /// Error of `kind` at `path`.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, path: Vec<PathSegment>) -> Self {
        Self {
            kind,
            message: message.into(),
            path,
        }
    }

    /// Error describing a resolver failure at `path`.
    #[must_use]
    pub fn from_resolver(error: &ResolverError, path: Vec<PathSegment>) -> Self {
        Self::new(error.kind(), error.detail(), path)
    }
}

impl Serialize for FieldError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry("path", &self.path)?;
        map.serialize_entry("extensions", &ErrorExtensions { code: self.kind })?;
        map.end()
    }
}

#[derive(Serialize)]
struct ErrorExtensions {
    code: ErrorKind,
}

/// Value held at a field position.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    /// No value.
    Null,
    /// A value with no further selections.
    Leaf(Value),
    /// A composite value with its selected fields, in selection order.
    Object(Vec<ResponseField>),
    /// A list whose elements carry their own sub-selections.
    List(Vec<ResponseValue>),
}

impl ResponseValue {
    /// Plain JSON form of the value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Leaf(value) => value.clone(),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|field| (field.key.clone(), field.value.to_json()))
                    .collect(),
            ),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ResponseField)) {
        match self {
            Self::Object(fields) => {
                for field in fields {
                    field.walk(visit);
                }
            }
            Self::List(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Self::Null | Self::Leaf(_) => {}
        }
    }
}

impl Serialize for ResponseValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Leaf(value) => value.serialize(serializer),
            Self::Object(fields) => serialize_fields(fields, serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

fn serialize_fields<S: Serializer>(fields: &[ResponseField], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for field in fields {
        map.serialize_entry(&field.key, &field.value)?;
    }
    map.end()
}

/// One field position in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseField {
    /// Response key (alias or field name).
    pub key: String,
    /// Final phase.
    pub phase: FieldPhase,
    /// Resolved value; `Null` whenever `error` is set.
    pub value: ResponseValue,
    /// Failure at this position.
    pub error: Option<FieldError>,
    /// Preamble headers the field's resolver emitted.
    pub metadata: ResponseMetadata,
}

impl ResponseField {
    /// A field that resolved to `value`.
    #[must_use]
    pub fn completed(key: impl Into<String>, value: ResponseValue) -> Self {
        Self {
            key: key.into(),
            phase: FieldPhase::Completed,
            value,
            error: None,
            metadata: ResponseMetadata::default(),
        }
    }

    /// A field that failed with `error`.
    ///
    /// Timeouts land in [`FieldPhase::TimedOut`], everything else in
    /// [`FieldPhase::Failed`].
    #[must_use]
    pub fn failed(key: impl Into<String>, error: FieldError) -> Self {
        let phase = if error.kind == ErrorKind::Timeout {
            FieldPhase::TimedOut
        } else {
            FieldPhase::Failed
        };
        Self {
            key: key.into(),
            phase,
            value: ResponseValue::Null,
            error: Some(error),
            metadata: ResponseMetadata::default(),
        }
    }

    /// Attaches resolver headers.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the field holds a value.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.phase == FieldPhase::Completed
    }

    /// Looks up a direct child field by response key.
    #[must_use]
    pub fn child(&self, key: &str) -> Option<&Self> {
        match &self.value {
            ResponseValue::Object(fields) => fields.iter().find(|field| field.key == key),
            _ => None,
        }
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Self)) {
        visit(self);
        self.value.walk(visit);
    }
}

/// A complete, possibly partial, response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    data: Vec<ResponseField>,
}

impl Response {
    /// Wraps the root fields.
    #[must_use]
    pub const fn new(data: Vec<ResponseField>) -> Self {
        Self { data }
    }

    /// Root fields in selection order.
    #[must_use]
    pub fn fields(&self) -> &[ResponseField] {
        &self.data
    }

    /// Looks up a root field by response key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&ResponseField> {
        self.data.iter().find(|field| field.key == key)
    }

    /// Every field error, depth first in selection order.
    #[must_use]
    pub fn errors(&self) -> Vec<&FieldError> {
        let mut errors = Vec::new();
        self.walk(&mut |field| {
            if let Some(error) = &field.error {
                errors.push(error);
            }
        });
        errors
    }

    /// Resolver headers, depth first in selection order.
    #[must_use]
    pub fn headers(&self) -> Vec<(&str, &str)> {
        let mut headers = Vec::new();
        self.walk(&mut |field| headers.extend(field.metadata.iter()));
        headers
    }

    /// Whether any field failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.errors().is_empty()
    }

    /// The `data` member as plain JSON.
    #[must_use]
    pub fn data_json(&self) -> Value {
        ResponseValue::Object(self.data.clone()).to_json()
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ResponseField)) {
        for field in &self.data {
            field.walk(visit);
        }
    }
}

#[derive(Serialize)]
struct Header<'a> {
    name: &'a str,
    value: &'a str,
}

struct Data<'a>(&'a [ResponseField]);

impl Serialize for Data<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_fields(self.0, serializer)
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let errors = self.errors();
        let headers: Vec<Header<'_>> = self
            .headers()
            .into_iter()
            .map(|(name, value)| Header { name, value })
            .collect();

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("data", &Data(&self.data))?;
        if !errors.is_empty() {
            map.serialize_entry("errors", &errors)?;
        }
        if !headers.is_empty() {
            let mut extensions = serde_json::Map::new();
            extensions.insert(
                "headers".to_owned(),
                serde_json::to_value(&headers).map_err(serde::ser::Error::custom)?,
            );
            map.serialize_entry("extensions", &extensions)?;
        }
        map.end()
    }
}

/// Why an assembler slot was never filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gap {
    /// The deadline passed before the result arrived.
    Expired,
    /// Every producer finished without delivering it.
    Abandoned,
}

/// Places results arriving in any order into their selection positions.
#[derive(Debug)]
pub struct ResponseAssembler<T> {
    slots: Vec<Option<T>>,
    filled: usize,
    gap: Gap,
}

impl<T> ResponseAssembler<T> {
    /// An assembler expecting `len` results.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
            filled: 0,
            gap: Gap::Abandoned,
        }
    }

    /// Stores `value` at `index`.
    ///
    /// Returns `false` for an out-of-range index or an already filled slot.
    pub fn place(&mut self, index: usize, value: T) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.filled += 1;
        true
    }

    /// Whether every slot holds a result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Receives `(index, result)` pairs until complete, the deadline, or
    /// every sender is gone.
    pub fn collect(&mut self, receiver: &Receiver<(usize, T)>, deadline: Instant) {
        while !self.is_complete() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.gap = Gap::Expired;
                return;
            }
            match receiver.recv_timeout(remaining) {
                Ok((index, value)) => {
                    self.place(index, value);
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.gap = Gap::Expired;
                    return;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.gap = Gap::Abandoned;
                    return;
                }
            }
        }
    }

    /// Returns results in index order, filling gaps with `fill`.
    pub fn finish(self, mut fill: impl FnMut(usize, Gap) -> T) -> Vec<T> {
        let gap = self.gap;
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| fill(index, gap)))
            .collect()
    }
}
