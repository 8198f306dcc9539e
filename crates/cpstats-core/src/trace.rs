//! Request-scoped span recorder.
//!
//! Every lookup opens one [`PipelineTrace`] and appends a span per stage.
//! Traces are kept in memory for diagnostics and dropped by
//! [`Tracer::cleanup`] once older than the retention horizon.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::ser::Error as SerError;
use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

/// Default retention horizon for finished and abandoned traces.
pub const DEFAULT_TRACE_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Free-form span annotations.
pub type SpanMetadata = BTreeMap<String, String>;

/// Correlation id exposed on every lookup response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TraceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Span id, sequential within its trace. The root span is always `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SpanId(u32);

impl SpanId {
    pub const ROOT: Self = Self(0);

    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Outcome recorded when a span ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpanResult {
    Pending,
    Ok,
    Error { code: String },
}

impl SpanResult {
    pub fn error(code: impl Into<String>) -> Self {
        Self::Error { code: code.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<SpanId>,
    pub operation: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: SpanMetadata,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(serialize_with = "serialize_rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub result: SpanResult,
    #[serde(skip)]
    started: Instant,
}

impl Span {
    fn open(id: SpanId, parent: Option<SpanId>, operation: String, metadata: SpanMetadata) -> Self {
        Self {
            id,
            parent,
            operation,
            metadata,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            duration_ms: None,
            result: SpanResult::Pending,
            started: Instant::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrace {
    pub trace_id: TraceId,
    pub root_span: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Spans in the order their operations started.
    pub spans: Vec<Span>,
    #[serde(skip)]
    started: Instant,
}

impl PipelineTrace {
    pub fn span(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(id.0 as usize)
    }

    pub fn operations(&self) -> Vec<&str> {
        self.spans.iter().map(|span| span.operation.as_str()).collect()
    }
}

/// In-memory trace table.
#[derive(Debug)]
pub struct Tracer {
    retention: Duration,
    traces: Mutex<HashMap<TraceId, PipelineTrace>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_RETENTION)
    }
}

impl Tracer {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            traces: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_trace<I, K, V>(&self, operation: &str, metadata: I) -> (TraceId, SpanId)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let trace_id = TraceId::new();
        let root = Span::open(SpanId::ROOT, None, operation.to_owned(), collect(metadata));
        let trace = PipelineTrace {
            trace_id: trace_id.clone(),
            root_span: SpanId::ROOT,
            duration_ms: None,
            started: root.started,
            spans: vec![root],
        };

        self.traces
            .lock()
            .expect("trace table lock is not poisoned")
            .insert(trace_id.clone(), trace);
        (trace_id, SpanId::ROOT)
    }

    /// Appends a child of the root span. Returns `None` for unknown or
    /// already collected traces.
    pub fn add_span<I, K, V>(&self, trace_id: &TraceId, operation: &str, metadata: I) -> Option<SpanId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut traces = self.traces.lock().expect("trace table lock is not poisoned");
        let trace = traces.get_mut(trace_id)?;
        let id = SpanId(u32::try_from(trace.spans.len()).ok()?);
        trace.spans.push(Span::open(
            id,
            Some(trace.root_span),
            operation.to_owned(),
            collect(metadata),
        ));
        Some(id)
    }

    /// Closes a span. Ending the root span also fixes the trace duration.
    /// Ending an already closed span is a no-op.
    pub fn end_span(&self, trace_id: &TraceId, span_id: SpanId, result: SpanResult) -> bool {
        let mut traces = self.traces.lock().expect("trace table lock is not poisoned");
        let Some(trace) = traces.get_mut(trace_id) else {
            return false;
        };
        let Some(span) = trace.spans.get_mut(span_id.0 as usize) else {
            return false;
        };
        if !span.is_open() {
            return false;
        }

        let elapsed = millis(span.started.elapsed());
        span.end_time = Some(OffsetDateTime::now_utc());
        span.duration_ms = Some(elapsed);
        span.result = result;
        debug!(
            trace_id = %trace_id,
            span = span_id.0,
            operation = %span.operation,
            duration_ms = elapsed,
            "span finished"
        );

        if span_id == trace.root_span {
            trace.duration_ms = Some(millis(trace.started.elapsed()));
        }
        true
    }

    pub fn annotate(&self, trace_id: &TraceId, span_id: SpanId, key: &str, value: impl Into<String>) {
        let mut traces = self.traces.lock().expect("trace table lock is not poisoned");
        if let Some(span) = traces
            .get_mut(trace_id)
            .and_then(|trace| trace.spans.get_mut(span_id.0 as usize))
        {
            span.metadata.insert(key.to_owned(), value.into());
        }
    }

    /// Snapshot of a trace for diagnostics.
    pub fn get(&self, trace_id: &TraceId) -> Option<PipelineTrace> {
        self.traces
            .lock()
            .expect("trace table lock is not poisoned")
            .get(trace_id)
            .cloned()
    }

    /// Removes traces that started longer ago than the retention horizon.
    pub fn cleanup(&self) -> usize {
        let retention = self.retention;
        let mut traces = self.traces.lock().expect("trace table lock is not poisoned");
        let before = traces.len();
        traces.retain(|_, trace| trace.started.elapsed() < retention);
        before - traces.len()
    }

    pub fn len(&self) -> usize {
        self.traces.lock().expect("trace table lock is not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect<I, K, V>(metadata: I) -> SpanMetadata
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    metadata
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn serialize_rfc3339<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let formatted = value.format(&Rfc3339).map_err(S::Error::custom)?;
    serializer.serialize_str(&formatted)
}

fn serialize_rfc3339_opt<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serialize_rfc3339(value, serializer),
        None => serializer.serialize_none(),
    }
}
