//! Module defining the traits a game must implement to be driven by the match engine,
//! and the configuration/outcome types it exchanges with the engine (§6).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire::AgentEnvelope;

/// The policy governing which agents act each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateMode {
    /// Every agent is sent the full world state and acts every tick.
    Simultaneous,
    /// Exactly one agent acts per tick, chosen by `Game::agent_to_move`.
    Alternating,
    /// Every agent acts every tick, but each sees only its own private state slice.
    Isolated,
}

/// The immutable bag of options a game publishes at match start (§3). Game-specific
/// fields pass through unchanged via `extra`, merged into the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_name: String,
    pub update_mode: UpdateMode,
    /// Ignored when the game itself decides finishing via `Game::finished`.
    #[serde(default)]
    pub n_epochs: Option<u64>,
    /// Per-step soft time limit. `None` means the game leaves this to the engine's
    /// own configured default (`EngineConfig::default_step_time_limit`, §2a).
    #[serde(with = "opt_duration_millis", default)]
    pub step_time_limit: Option<Duration>,
    /// Cumulative overtime pool. `None` means the game leaves this to the engine's
    /// own configured default (`EngineConfig::default_step_limit_pool`, §2a).
    #[serde(with = "opt_duration_millis", default)]
    pub step_limit_pool: Option<Duration>,
    /// Game-specific fields, passed through to agents and to the replay unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameConfig {
    pub fn new(game_name: impl Into<String>, update_mode: UpdateMode) -> Self {
        GameConfig {
            game_name: game_name.into(),
            update_mode,
            n_epochs: None,
            step_time_limit: None,
            step_limit_pool: None,
            extra: Map::new(),
        }
    }

    pub fn with_n_epochs(mut self, n: u64) -> Self {
        self.n_epochs = Some(n);
        self
    }

    /// Override the engine's default soft per-step time limit for this game.
    pub fn with_step_time_limit(mut self, d: Duration) -> Self {
        self.step_time_limit = Some(d);
        self
    }

    /// Override the engine's default overtime pool for this game.
    pub fn with_step_limit_pool(mut self, d: Duration) -> Self {
        self.step_limit_pool = Some(d);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

mod opt_duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// The terminal descriptor a game returns once a match has ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// e.g. `"FINISHED"` or `"TAINTED"` (§7: a tainted match always reports this).
    pub termination: String,
    /// Game-specific fields such as `winner`, passed through unchanged.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Outcome {
    pub fn new(termination: impl Into<String>) -> Self {
        Outcome {
            termination: termination.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// The outcome reported when the match ends because an agent was tainted (§7).
    pub fn tainted() -> Self {
        Self::new("TAINTED")
    }
}

/// One agent's reply for a single tick, as delivered to `Game::update`.
#[derive(Debug, Clone)]
pub struct AgentAction {
    pub agent_id: u32,
    pub envelope: AgentEnvelope,
}

/// What a game must implement to be driven by the match engine.
///
/// `state()` must serialize to a JSON object (a map), since ISOLATED mode needs to
/// read and strip a `state_by_agent` key from it (§4.3), and the engine enriches it
/// with `epoch`/`agent_ids` before sending it on.
pub trait Game {
    /// The engine-facing configuration, constant for the whole match.
    fn config(&self) -> &GameConfig;

    /// Register an agent that will participate in the match. Must be idempotent on
    /// repeated registration of the same id.
    fn register_agent(&mut self, id: u32);

    /// The full world state for the upcoming tick, serialized as a JSON object.
    fn state(&self) -> Value;

    /// Apply this tick's collected actions. `agent_actions` preserves registration
    /// order (§4.3) regardless of update mode.
    fn update(&mut self, agent_actions: &[AgentAction]);

    /// `true` once the match should stop ticking.
    fn finished(&self) -> bool;

    /// The terminal descriptor, valid once `finished()` is true (or the match was
    /// aborted due to taint, in which case the engine overrides it with
    /// [`Outcome::tainted`]).
    fn outcome(&self) -> Outcome;

    /// Final per-agent scores, keyed by agent id.
    fn scores(&self) -> HashMap<u32, f64>;

    /// Which agent should act this tick. Mandatory for `UpdateMode::Alternating`;
    /// the default implementation panics, since a game declaring ALTERNATING without
    /// overriding this is an engine-level invariant violation (§7, ENGINE errors).
    fn agent_to_move(&self) -> u32 {
        panic!("Game::agent_to_move must be implemented for UpdateMode::Alternating")
    }
}

/// What will be given to the match engine to allow it to create games — one instance
/// per match, so a single factory can drive many concurrent matches.
pub trait GameFactory<G: Game> {
    fn new_game(&self) -> G;
}

#[cfg(test)]
mod interface_tests {
    use super::*;
    use std::time::Duration;

    struct DummyGame {
        config: GameConfig,
        agents: Vec<u32>,
        tick: u64,
    }

    impl Game for DummyGame {
        fn config(&self) -> &GameConfig {
            &self.config
        }

        fn register_agent(&mut self, id: u32) {
            if !self.agents.contains(&id) {
                self.agents.push(id);
            }
        }

        fn state(&self) -> Value {
            serde_json::json!({ "tick": self.tick })
        }

        fn update(&mut self, _agent_actions: &[AgentAction]) {
            self.tick += 1;
        }

        fn finished(&self) -> bool {
            self.tick >= 3
        }

        fn outcome(&self) -> Outcome {
            Outcome::new("FINISHED")
        }

        fn scores(&self) -> HashMap<u32, f64> {
            self.agents.iter().map(|&id| (id, 0.0)).collect()
        }
    }

    struct DummyFactory;

    impl GameFactory<DummyGame> for DummyFactory {
        fn new_game(&self) -> DummyGame {
            DummyGame {
                config: GameConfig::new("dummy", UpdateMode::Simultaneous),
                agents: vec![],
                tick: 0,
            }
        }
    }

    #[test]
    fn register_agent_is_idempotent() {
        let mut game = DummyFactory.new_game();
        game.register_agent(1);
        game.register_agent(1);
        assert_eq!(game.agents, vec![1]);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = GameConfig::new("dummy", UpdateMode::Isolated)
            .with_step_time_limit(Duration::from_millis(50))
            .with_extra("board_size", serde_json::json!(8));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["update_mode"], "ISOLATED");
        assert_eq!(value["board_size"], 8);
        assert_eq!(value["step_time_limit"], 50);
    }

    #[test]
    fn finished_after_three_updates() {
        let mut game = DummyFactory.new_game();
        assert!(!game.finished());
        for _ in 0..3 {
            game.update(&[]);
        }
        assert!(game.finished());
    }
}
