//! The line-delimited JSON wire protocol exchanged with agent processes.
//!
//! Engine-to-agent messages are small single-purpose objects (§6); world-state and
//! isolated-state payloads stay as an opaque [`serde_json::Value`] since their shape is
//! entirely game-defined. Agent-to-engine replies always deserialize into [`AgentEnvelope`];
//! unrecognized keys are silently ignored, per the protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"set_agent_id": id}`
#[derive(Debug, Serialize)]
pub struct SetAgentIdRequest<'a> {
    pub set_agent_id: &'a str,
}

/// `{"ping": <truthy>}`
#[derive(Debug, Serialize)]
pub struct PingRequest {
    pub ping: Value,
}

impl Default for PingRequest {
    fn default() -> Self {
        PingRequest {
            ping: Value::String("foobar".to_owned()),
        }
    }
}

/// `{"config": {...}}`
#[derive(Debug, Serialize)]
pub struct ConfigRequest<'a> {
    pub config: &'a Value,
}

/// `{"stop": {"reason": "..."}}`
#[derive(Debug, Serialize)]
pub struct StopRequest<'a> {
    pub stop: StopReason<'a>,
}

/// The `reason` payload nested under `stop`.
#[derive(Debug, Serialize)]
pub struct StopReason<'a> {
    pub reason: &'a str,
}

/// Everything an agent may send back. All fields are optional since any subset of
/// reserved keys may be present alongside game-defined `actions`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentEnvelope {
    /// Echo of the id the engine assigned, used to authenticate the reply.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Learned on the first reply, kept for the match result.
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Learned on the first reply, kept for the match result.
    #[serde(default)]
    pub agent_version: Option<String>,
    /// Non-null iff the agent acknowledged a `ping`.
    #[serde(default)]
    pub pong: Option<Value>,
    /// Game-defined action records; opaque to the core.
    #[serde(default)]
    pub actions: Option<Vec<Value>>,
}

impl AgentEnvelope {
    /// The envelope returned to the engine when an exchange failed outright —
    /// no actions, no echoed identity.
    pub fn empty() -> Self {
        Self::default()
    }
}
