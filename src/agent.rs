//! The agent record (§3): everything the engine knows about one agent, independent of
//! its transport. Owned exclusively by the agent's [`crate::supervisor::AgentSupervisor`].

use std::path::PathBuf;

use crate::error::{ProtocolErrorKind, TaintReason};
use crate::time_accountant::TimeAccountant;

/// A protocol acknowledgement that hasn't necessarily happened yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unknown,
    True,
    False,
}

impl TriState {
    pub fn from_bool(b: bool) -> Self {
        if b {
            TriState::True
        } else {
            TriState::False
        }
    }
}

/// One recorded protocol failure, kept for diagnostics; the count that actually
/// matters for tainting (`MAX_ERRORS`) is tracked separately as `error_count`.
#[derive(Debug, Clone)]
pub struct RecordedError {
    pub kind: ProtocolErrorKind,
    pub tick: Option<u64>,
}

/// Keep only the most recent errors in memory; the taint-relevant quantity is the
/// running count, tracked separately in `error_count`.
const MAX_RETAINED_ERRORS: usize = 32;

/// Everything the engine knows about one agent.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: u32,
    pub path: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,

    pub started: TriState,
    pub pinged: TriState,
    pub configured: TriState,
    pub id_set: TriState,

    errors: Vec<RecordedError>,
    error_count: usize,

    taint: Option<TaintReason>,

    pub time: TimeAccountant,
}

impl AgentRecord {
    pub fn new(
        id: u32,
        path: PathBuf,
        step_time_limit: std::time::Duration,
        step_limit_pool: std::time::Duration,
    ) -> Self {
        AgentRecord {
            id,
            path,
            name: None,
            version: None,
            started: TriState::Unknown,
            pinged: TriState::Unknown,
            configured: TriState::Unknown,
            id_set: TriState::Unknown,
            errors: Vec::new(),
            error_count: 0,
            taint: None,
            time: TimeAccountant::new(step_time_limit, step_limit_pool),
        }
    }

    /// Record a protocol-level error. Returns the new error count; the caller
    /// (the supervisor) decides whether this crosses `max_errors` into TOO_MANY_ERRORS.
    pub fn record_error(&mut self, kind: ProtocolErrorKind, tick: Option<u64>) -> usize {
        if self.errors.len() >= MAX_RETAINED_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(RecordedError { kind, tick });
        self.error_count += 1;
        self.error_count
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn recorded_errors(&self) -> &[RecordedError] {
        &self.errors
    }

    /// First taint wins; subsequent calls are no-ops (testable property 3).
    pub fn taint(&mut self, reason: TaintReason) {
        if self.taint.is_none() {
            self.taint = Some(reason);
        }
    }

    pub fn is_tainted(&self) -> bool {
        self.taint.is_some()
    }

    pub fn taint_reason(&self) -> Option<TaintReason> {
        self.taint
    }
}
