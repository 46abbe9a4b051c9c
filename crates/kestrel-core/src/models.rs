use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An HTTP response as handed back by a [`Transport`](crate::traits::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A fetched remote resource, ready for upsert.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResourceRecord {
    pub id: i64,
    pub payload: serde_json::Value,
    /// Whether the remote considers the resource closed. Unfinished
    /// resources are periodically re-fetched.
    pub finished: bool,
}

impl ResourceRecord {
    /// Build a record, deriving `finished` from a non-null `finished` field.
    pub fn from_payload(id: i64, payload: serde_json::Value) -> Self {
        let finished = match payload.get("finished") {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(_) => true,
        };
        Self {
            id,
            payload,
            finished,
        }
    }
}

/// Outcome recorded by the fetch audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchOutcome {
    Ok,
    Error,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Ok => "ok",
            FetchOutcome::Error => "error",
        }
    }
}

impl std::str::FromStr for FetchOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(FetchOutcome::Ok),
            "error" => Ok(FetchOutcome::Error),
            _ => Err(format!("Unknown fetch outcome: {s}")),
        }
    }
}

/// DTO for inserting an audit entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NewFetchLogEntry {
    pub url: String,
    pub outcome: FetchOutcome,
    pub items_observed: i32,
    pub items_new: i32,
    pub error_message: Option<String>,
}

/// A stored audit entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FetchLogEntry {
    pub id: Uuid,
    pub url: String,
    pub outcome: FetchOutcome,
    pub items_observed: i32,
    pub items_new: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
