//! Event types for poller observability
//!
//! Each reconciliation pass produces exactly one event: either the findings it
//! derived or the reason it aborted.

use crate::{Finding, PassId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all poller events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// Host that ran the pass
    pub reporter: Option<String>,

    /// The actual event
    pub event: PollEvent,
}

impl PollEventEnvelope {
    pub fn new(event: PollEvent) -> Self {
        let severity = event.default_severity();
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity,
            reporter: None,
            event,
        }
    }

    pub fn with_reporter(mut self, reporter: impl Into<String>) -> Self {
        self.reporter = Some(reporter.into());
        self
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Poller events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PollEvent {
    /// Pass finished and both inventories were compared
    PassCompleted {
        pass_id: PassId,
        ad_count: usize,
        stack_count: usize,
        findings: Vec<Finding>,
        duration_ms: u64,
    },

    /// Pass aborted before any comparison
    PassAborted {
        pass_id: PassId,
        /// Error class, e.g. `transport`
        class: String,
        reason: String,
    },

    /// Timer fired while a pass was still running and was dropped
    TickSkipped,
}

impl PollEvent {
    fn default_severity(&self) -> EventSeverity {
        match self {
            PollEvent::PassCompleted { findings, .. } if findings.is_empty() => EventSeverity::Info,
            PollEvent::PassCompleted { .. } => EventSeverity::Warning,
            PollEvent::PassAborted { .. } => EventSeverity::Error,
            PollEvent::TickSkipped => EventSeverity::Debug,
        }
    }
}
