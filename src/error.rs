//! Typed error kinds for the match engine.
//!
//! Two tiers, mirroring how the rest of the crate separates agent-caused failures
//! (recorded against the agent, never raised) from engine-caused failures (propagated
//! to the caller via [`anyhow`]). See crate-level docs for the propagation policy.

/// Errors produced by the [`crate::channel::LineChannel`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Writing to the child's stdin failed, or the stream is closed/broken.
    #[error("channel write failed: {0}")]
    Write(String),

    /// No line arrived from the child within the deadline.
    #[error("channel read timed out")]
    ReadTimeout,

    /// The child's stdout closed before a reply was produced.
    #[error("channel hit EOF")]
    Eof,

    /// A line arrived but was not valid JSON.
    #[error("malformed JSON from agent: {0}")]
    Parse(#[from] serde_json::Error),

    /// `send` was called again before the previous reply was consumed via `recv`.
    #[error("send called without consuming the previous reply")]
    OrderingViolation,
}

/// The reason an agent-level exchange failed, independent of the specific
/// [`ChannelError`] — this is what gets recorded against the agent's error list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolErrorKind {
    /// A reply line failed to parse as JSON.
    #[error("PARSE_ERROR")]
    ParseError,
    /// No reply arrived before the deadline.
    #[error("CHANNEL_READ_TIMEOUT")]
    ChannelReadTimeout,
    /// The channel closed unexpectedly.
    #[error("CHANNEL_EOF")]
    ChannelEof,
    /// A message could not be written to the child.
    #[error("CHANNEL_WRITE")]
    ChannelWrite,
    /// A reply was missing a field the protocol requires for that exchange.
    #[error("UNEXPECTED_FIELD")]
    UnexpectedField,
}

impl From<&ChannelError> for ProtocolErrorKind {
    fn from(e: &ChannelError) -> Self {
        match e {
            ChannelError::Write(_) => ProtocolErrorKind::ChannelWrite,
            ChannelError::ReadTimeout => ProtocolErrorKind::ChannelReadTimeout,
            ChannelError::Eof => ProtocolErrorKind::ChannelEof,
            ChannelError::Parse(_) => ProtocolErrorKind::ParseError,
            ChannelError::OrderingViolation => ProtocolErrorKind::UnexpectedField,
        }
    }
}

/// The terminal, frozen reason an agent was tainted. See §4.2 of the design doc:
/// the first transition wins and this value never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaintReason {
    /// `errors.count` exceeded `max_errors`.
    TooManyErrors,
    /// The agent process failed to start or never acknowledged `set_agent_id`.
    StartupFail,
    /// The agent's `set_agent_id` reply was missing or did not echo the assigned id.
    SetAgentIdFail,
    /// The agent never acknowledged a `ping` with a non-null `pong`.
    PingFail,
    /// The agent's `config` message could not be acknowledged.
    SetConfigFail,
    /// The time accountant's overtime pool went negative.
    Timeout,
}

/// Engine-level invariant violations. These are fatal to the match and propagate to
/// the caller via `anyhow` rather than being recorded against any single agent.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `update_mode` did not match any known variant, or ALTERNATING was requested
    /// but the game did not implement `agent_to_move`.
    #[error("invalid update mode for this game: {0}")]
    InvalidUpdateMode(String),

    /// ISOLATED mode was requested but the world state carries no `state_by_agent` map.
    #[error("isolated update mode requires a `state_by_agent` map in the world state")]
    MissingStateByAgent,

    /// The process spawner could not start an agent.
    #[error("failed to spawn agent {id} at {path}: {source}")]
    SpawnFailed {
        /// Agent id that failed to spawn.
        id: u32,
        /// Path to the agent's entry point.
        path: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
}
