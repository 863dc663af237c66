use std::fmt;

/// Maximum length for client-supplied trace IDs.
const MAX_TRACE_ID_LEN: usize = 128;

/// Correlation identifier for one inbound call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Accept a trace ID supplied by a client.
    ///
    /// The value is truncated to 128 characters and stripped of anything but
    /// printable ASCII. An empty result falls back to a fresh ID.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic())
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-call context threaded through every core operation.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    trace_id: TraceId,
    identity: Option<String>,
}

impl RequestContext {
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            identity: None,
        }
    }

    /// Attach the name of the authenticated caller.
    pub fn with_identity(mut self, name: impl Into<String>) -> Self {
        self.identity = Some(name.into());
        self
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }
}
