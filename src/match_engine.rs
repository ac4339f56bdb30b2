//! The match engine tick loop (§4.3): start phase, per-tick dispatch under the three
//! update modes, replay journaling, and the stop-phase result builder.

use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::configuration::EngineConfig;
use crate::error::{EngineError, TaintReason};
use crate::game_interface::{AgentAction, Game, GameConfig, Outcome, UpdateMode};
use crate::replay::{ReplayJournal, ReplayRecord};
use crate::spawner::Spawner;
use crate::supervisor::AgentSupervisor;

/// One agent's entry in the match, as supplied by the caller.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub id: u32,
    pub path: PathBuf,
}

/// One agent's final standing in a [`MatchResult`].
#[derive(Debug, Clone)]
pub struct AgentScore {
    pub id: u32,
    pub name: Option<String>,
    pub version: Option<String>,
    pub path: PathBuf,
    pub score: f64,
    pub tainted: bool,
    pub taint_reason: Option<TaintReason>,
}

/// The final report of a completed match (§3).
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Sorted by descending score.
    pub agents: Vec<AgentScore>,
    pub outcome: Outcome,
    pub replay_file: PathBuf,
    pub has_tainted_agent: bool,
}

/// Drives one game instance through its whole lifecycle against a set of agents.
pub struct MatchEngine<G: Game> {
    game: G,
    supervisors: Vec<AgentSupervisor>,
    journal: ReplayJournal,
    epoch: u64,
    /// `game.config()` with any unset timing fields resolved against
    /// `EngineConfig`'s defaults; this, not the game's possibly-`None` raw config, is
    /// what's serialized to agents and to the replay journal.
    resolved_config: GameConfig,
    debug_agent_stderr: bool,
}

impl<G: Game> MatchEngine<G> {
    pub fn new(
        game: G,
        specs: Vec<AgentSpec>,
        engine_config: &EngineConfig,
    ) -> Self {
        let mut resolved_config = game.config().clone();
        let step_time_limit = resolved_config
            .step_time_limit
            .unwrap_or(engine_config.default_step_time_limit);
        let step_limit_pool = resolved_config
            .step_limit_pool
            .unwrap_or(engine_config.default_step_limit_pool);
        resolved_config.step_time_limit = Some(step_time_limit);
        resolved_config.step_limit_pool = Some(step_limit_pool);

        let supervisors = specs
            .into_iter()
            .map(|spec| {
                AgentSupervisor::new(
                    spec.id,
                    spec.path,
                    engine_config,
                    step_time_limit,
                    step_limit_pool,
                )
            })
            .collect();
        let journal = ReplayJournal::new(&engine_config.replay_dir, &resolved_config.game_name);
        MatchEngine {
            game,
            supervisors,
            journal,
            epoch: 0,
            resolved_config,
            debug_agent_stderr: engine_config.debug_agent_stderr,
        }
    }

    fn any_tainted(&self) -> bool {
        self.supervisors.iter().any(|s| s.is_tainted())
    }

    fn agent_ids(&self) -> Vec<u32> {
        self.supervisors.iter().map(|s| s.record.id).collect()
    }

    /// Run the match to completion: start phase, tick loop, stop phase.
    #[instrument(skip(self, spawner))]
    pub fn run(mut self, spawner: &Spawner) -> anyhow::Result<MatchResult> {
        self.start_phase(spawner)?;

        if !self.any_tainted() {
            while !self.game.finished() {
                self.tick()?;
                if self.any_tainted() {
                    break;
                }
            }
        }

        Ok(self.stop_phase())
    }

    fn start_phase(&mut self, spawner: &Spawner) -> anyhow::Result<()> {
        let config_value = serde_json::to_value(&self.resolved_config)?;
        let ids: Vec<u32> = self.agent_ids();
        let debug_agent_stderr = self.debug_agent_stderr;

        for id in ids {
            let supervisor = self
                .supervisors
                .iter_mut()
                .find(|s| s.record.id == id)
                .expect("id drawn from own supervisor list");

            supervisor.start(|path| spawner.spawn(path, id, debug_agent_stderr));
            self.game.register_agent(id);

            let supervisor = self
                .supervisors
                .iter_mut()
                .find(|s| s.record.id == id)
                .expect("id drawn from own supervisor list");
            supervisor.ping();
            supervisor.set_config(&config_value);
        }

        info!(tainted = self.any_tainted(), "start phase complete");
        Ok(())
    }

    #[instrument(skip(self))]
    fn tick(&mut self) -> anyhow::Result<()> {
        self.epoch += 1;
        let world_state = self.game.state();
        let agent_ids = self.agent_ids();

        let mut enriched = match world_state.clone() {
            Value::Object(map) => map,
            other => anyhow::bail!("Game::state must serialize to a JSON object, got {other}"),
        };
        enriched.insert("epoch".to_owned(), Value::from(self.epoch));
        enriched.insert(
            "agent_ids".to_owned(),
            Value::Array(agent_ids.iter().map(|&id| Value::from(id)).collect()),
        );

        let actions = match self.game.config().update_mode {
            UpdateMode::Simultaneous => self.dispatch_simultaneous(&enriched)?,
            UpdateMode::Alternating => self.dispatch_alternating(&enriched)?,
            UpdateMode::Isolated => self.dispatch_isolated(&mut enriched)?,
        };

        let actions_value = serde_json::to_value(
            actions
                .iter()
                .map(|a| &a.envelope)
                .collect::<Vec<_>>(),
        )?;

        self.journal.write_record(&ReplayRecord {
            config: &serde_json::to_value(&self.resolved_config)?,
            epoch: self.epoch,
            max_epoch: self.resolved_config.n_epochs,
            world_state: &world_state,
            agent_actions: &actions_value,
            agent_ids: &agent_ids,
        })?;

        self.game.update(&actions);
        Ok(())
    }

    fn dispatch_simultaneous(&mut self, state: &Map<String, Value>) -> anyhow::Result<Vec<AgentAction>> {
        let state_value = Value::Object(state.clone());
        let mut actions = Vec::with_capacity(self.supervisors.len());
        for supervisor in self.supervisors.iter_mut() {
            if supervisor.is_tainted() {
                continue;
            }
            let envelope = supervisor.update_state(&state_value, self.epoch);
            actions.push(AgentAction {
                agent_id: supervisor.record.id,
                envelope,
            });
        }
        Ok(actions)
    }

    fn dispatch_alternating(&mut self, state: &Map<String, Value>) -> anyhow::Result<Vec<AgentAction>> {
        let state_value = Value::Object(state.clone());
        let mover = self.game.agent_to_move();
        let supervisor = self
            .supervisors
            .iter_mut()
            .find(|s| s.record.id == mover)
            .ok_or_else(|| EngineError::InvalidUpdateMode(format!("agent_to_move returned unknown id {mover}")))?;

        if supervisor.is_tainted() {
            return Ok(vec![]);
        }

        let envelope = supervisor.update_state(&state_value, self.epoch);
        Ok(vec![AgentAction {
            agent_id: mover,
            envelope,
        }])
    }

    fn dispatch_isolated(&mut self, state: &mut Map<String, Value>) -> anyhow::Result<Vec<AgentAction>> {
        let mut state_by_agent = match state.remove("state_by_agent") {
            Some(Value::Object(map)) => map,
            Some(_) | None => return Err(EngineError::MissingStateByAgent.into()),
        };

        let mut actions = Vec::with_capacity(self.supervisors.len());
        for supervisor in self.supervisors.iter_mut() {
            if supervisor.is_tainted() {
                continue;
            }
            let id = supervisor.record.id;
            let mut payload = state.clone();
            match state_by_agent.remove(&id.to_string()) {
                Some(Value::Object(private)) => payload.extend(private),
                Some(_) => warn!(agent_id = id, "state_by_agent entry is not an object, ignoring"),
                None => warn!(agent_id = id, "state_by_agent has no entry for this agent"),
            }
            let envelope = supervisor.update_state(&Value::Object(payload), self.epoch);
            actions.push(AgentAction {
                agent_id: id,
                envelope,
            });
        }
        Ok(actions)
    }

    fn stop_phase(mut self) -> MatchResult {
        for supervisor in self.supervisors.iter_mut() {
            supervisor.stop("match ended");
        }

        let mut scores = self.game.scores();
        let has_tainted_agent = self.any_tainted();
        let outcome = if has_tainted_agent {
            Outcome::tainted()
        } else {
            self.game.outcome()
        };

        let mut agents: Vec<AgentScore> = self
            .supervisors
            .iter()
            .map(|s| AgentScore {
                id: s.record.id,
                name: s.record.name.clone(),
                version: s.record.version.clone(),
                path: s.record.path.clone(),
                score: scores.remove(&s.record.id).unwrap_or(0.0),
                tainted: s.is_tainted(),
                taint_reason: s.record.taint_reason(),
            })
            .collect();

        agents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        MatchResult {
            agents,
            outcome,
            replay_file: self.journal.path().to_path_buf(),
            has_tainted_agent,
        }
    }
}
