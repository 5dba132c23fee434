use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const KEY_SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Full,
    Partial,
    Live,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Full => "full",
            UpdateKind::Partial => "partial",
            UpdateKind::Live => "live",
        }
    }

    /// Anything that is not `full` or `partial` is a live-only refresh.
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "full" => UpdateKind::Full,
            "partial" => UpdateKind::Partial,
            _ => UpdateKind::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub ticker: String,
    pub kind: UpdateKind,
}

impl JobKey {
    pub fn new(ticker: impl Into<String>, kind: UpdateKind) -> Self {
        Self {
            ticker: ticker.into(),
            kind,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.ticker, KEY_SEPARATOR, self.kind.as_str())
    }

    pub fn decode(value: &str) -> Result<Self, String> {
        let (ticker, kind) = value
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| format!("invalid job key: {value}"))?;
        if ticker.is_empty() {
            return Err(format!("invalid job key: {value}"));
        }
        Ok(Self::new(ticker, UpdateKind::parse_lossy(kind)))
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.ticker, KEY_SEPARATOR, self.kind.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}
