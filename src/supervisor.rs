//! The agent supervisor (§4.2): owns one agent's channel and record, drives the
//! protocol exchanges, and is the sole place the taint state machine can fire from.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{instrument, trace, warn};

use crate::agent::{AgentRecord, TriState};
use crate::channel::LineChannel;
use crate::configuration::EngineConfig;
use crate::error::{ChannelError, ProtocolErrorKind, TaintReason};
use crate::wire::{AgentEnvelope, ConfigRequest, PingRequest, SetAgentIdRequest, StopReason, StopRequest};

/// Owns one agent's channel and record; proxies every exchange described in §4.2.
pub struct AgentSupervisor {
    pub record: AgentRecord,
    channel: Option<LineChannel>,
    step_time_limit: Duration,
    start_deadline: Duration,
    max_errors: usize,
    last_envelope: AgentEnvelope,
}

impl AgentSupervisor {
    /// Create a supervisor for agent `id`, whose entry point lives at `path`, timed
    /// against the already-resolved `step_time_limit`/`step_limit_pool` (any
    /// per-game/engine-default fallback is resolved by the caller). The channel is not
    /// opened until [`Self::start`] is called.
    pub fn new(
        id: u32,
        path: PathBuf,
        config: &EngineConfig,
        step_time_limit: Duration,
        step_limit_pool: Duration,
    ) -> Self {
        AgentSupervisor {
            record: AgentRecord::new(id, path, step_time_limit, step_limit_pool),
            channel: None,
            step_time_limit,
            start_deadline: config.start_deadline,
            max_errors: config.max_errors,
            last_envelope: AgentEnvelope::empty(),
        }
    }

    pub fn is_tainted(&self) -> bool {
        self.record.is_tainted()
    }

    fn taint(&mut self, reason: TaintReason) {
        if !self.record.is_tainted() {
            warn!(agent_id = self.record.id, ?reason, "agent tainted");
        }
        self.record.taint(reason);
    }

    /// Record a protocol error against the agent; taints with TOO_MANY_ERRORS if this
    /// pushes the count past `max_errors`.
    fn record_error(&mut self, kind: ProtocolErrorKind, tick: Option<u64>) {
        let count = self.record.record_error(kind, tick);
        if count > self.max_errors {
            self.taint(TaintReason::TooManyErrors);
        }
    }

    /// Spawn the child process and complete the `set_agent_id` handshake (§4.2).
    #[instrument(skip(self, spawn), fields(agent_id = self.record.id))]
    pub fn start<F>(&mut self, spawn: F)
    where
        F: FnOnce(&std::path::Path) -> anyhow::Result<LineChannel>,
    {
        let channel = match spawn(&self.record.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to spawn agent: {e}");
                self.record.started = TriState::False;
                self.taint(TaintReason::StartupFail);
                return;
            }
        };
        self.channel = Some(channel);
        self.record.started = TriState::True;

        let id_str = self.record.id.to_string();
        let request = SetAgentIdRequest {
            set_agent_id: &id_str,
        };

        let reply = self.exchange(&request, self.start_deadline);
        match reply {
            Ok(envelope) => {
                let matches = envelope.agent_id.as_deref() == Some(id_str.as_str());
                self.record.id_set = TriState::from_bool(matches);
                if !matches {
                    self.taint(TaintReason::SetAgentIdFail);
                    return;
                }
                if let Some(name) = envelope.agent_name {
                    self.record.name = Some(name);
                }
                if let Some(version) = envelope.agent_version {
                    self.record.version = Some(version);
                }
            }
            Err(_) => {
                self.record.id_set = TriState::False;
                self.taint(TaintReason::SetAgentIdFail);
            }
        }
    }

    /// Liveness check: require a non-null `pong` within the step time limit (§4.2).
    #[instrument(skip(self), fields(agent_id = self.record.id))]
    pub fn ping(&mut self) {
        if self.record.is_tainted() {
            return;
        }
        let request = PingRequest::default();
        match self.exchange(&request, self.step_time_limit) {
            Ok(envelope) if envelope.pong.is_some() => {
                self.record.pinged = TriState::True;
            }
            _ => {
                self.record.pinged = TriState::False;
                self.taint(TaintReason::PingFail);
            }
        }
    }

    /// Send the game configuration; any receivable reply (or none, per §9's decision
    /// that acknowledgement is required) satisfies the exchange.
    #[instrument(skip(self, cfg), fields(agent_id = self.record.id))]
    pub fn set_config(&mut self, cfg: &Value) {
        if self.record.is_tainted() {
            return;
        }
        let request = ConfigRequest { config: cfg };
        match self.exchange(&request, self.step_time_limit) {
            Ok(_) => self.record.configured = TriState::True,
            Err(_) => {
                self.record.configured = TriState::False;
                self.taint(TaintReason::SetConfigFail);
            }
        }
    }

    /// Send the per-tick state and collect this tick's action envelope (§4.2). Any
    /// failure is recorded as a protocol error and returns an empty envelope; it does
    /// not taint on its own unless it pushes the error count over the limit or the
    /// read genuinely misses its pool-aware deadline (TIMEOUT).
    ///
    /// The read deadline is widened to `step_time_limit + remaining pool`: a reply
    /// that lands within the soft limit but inside the overtime pool must still be
    /// received and measured (and debited against the pool), not treated as an
    /// instant timeout. Only a read that misses even this widened deadline is a
    /// genuine TIMEOUT — by construction such a read's `overage` can never exceed
    /// the remaining pool, so the pool never needs a separate post-hoc exhaustion
    /// check on the success path.
    #[instrument(skip(self, state), fields(agent_id = self.record.id))]
    pub fn update_state(&mut self, state: &Value, tick: u64) -> AgentEnvelope {
        if self.record.is_tainted() {
            return AgentEnvelope::empty();
        }

        self.record.time.tick_start();
        let deadline = self.step_time_limit + self.record.time.remaining();
        let result = self.exchange(state, deadline);

        let (envelope, timed_out) = match result {
            Ok(envelope) => {
                self.record.time.tick_end();
                (envelope, false)
            }
            Err(ChannelError::ReadTimeout) => {
                // §5: a read that misses its deadline records a duration equal to the
                // deadline itself.
                self.record.time.record(deadline);
                self.record_error(ProtocolErrorKind::ChannelReadTimeout, Some(tick));
                (AgentEnvelope::empty(), true)
            }
            Err(e) => {
                self.record.time.tick_end();
                self.record_error(ProtocolErrorKind::from(&e), Some(tick));
                (AgentEnvelope::empty(), false)
            }
        };

        if timed_out {
            self.taint(TaintReason::Timeout);
        }

        self.last_envelope = envelope.clone();
        envelope
    }

    /// The most recently collected action envelope. If the echoed `agent_id` doesn't
    /// match, this is logged but still returned — a supervisor-level assertion, not
    /// taint-worthy on its own (§4.2).
    pub fn get_actions(&self) -> &AgentEnvelope {
        let id_str = self.record.id.to_string();
        if let Some(echoed) = &self.last_envelope.agent_id {
            if echoed != &id_str {
                trace!(
                    agent_id = self.record.id,
                    echoed,
                    "agent_id mismatch in action envelope"
                );
            }
        }
        &self.last_envelope
    }

    /// Request termination; no reply is awaited, since agents are permitted not to
    /// respond (§4.2).
    #[instrument(skip(self), fields(agent_id = self.record.id))]
    pub fn stop(&mut self, reason: &str) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        let request = StopRequest {
            stop: StopReason { reason },
        };
        if let Err(e) = channel.send(&request) {
            trace!("stop not acknowledged (expected): {e}");
        }
        channel.close();
    }

    fn exchange(
        &mut self,
        request: &impl serde::Serialize,
        deadline: Duration,
    ) -> Result<AgentEnvelope, ChannelError> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(ChannelError::Eof);
        };
        channel.send(request)?;
        let value = channel.recv(deadline)?;
        serde_json::from_value(value).map_err(ChannelError::Parse)
    }
}
