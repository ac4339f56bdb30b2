//! # Match Engine
//!
//! A per-tick match engine and agent-process supervisor for programmatic-game
//! tournaments: agents are untrusted external programs spawned as child processes
//! (native or containerized), driven through a line-delimited JSON protocol over
//! stdio, and subject to protocol and timing discipline enforced by a taint state
//! machine.
//!
//! It provides:
//! - A framed request/response [`channel`] to a child process with deadline-bounded reads
//! - A [`supervisor`] that tracks one agent's protocol state, error count and taint reason
//! - A [`match_engine`] tick loop dispatching updates under three update modes
//! - A [`game_interface`] trait contract that concrete games implement
//! - A [`replay`] journal recording every tick for external analysis
//!
//! Concrete game rules, container build/run adapters, and tournament-level
//! scheduling are out of scope for this crate; see [`game_interface::Game`] and
//! [`spawner::ContainerAdapter`] for the seams where they plug in.
//!
//! # Usage Example
//!
//! ```no_run
//! # use std::collections::HashMap;
//! # use serde_json::Value;
//! # use match_engine::prelude::*;
//! #[derive(Clone)]
//! struct YourGame {
//!     config: GameConfig,
//!     tick: u64,
//! }
//!
//! impl Game for YourGame {
//!     fn config(&self) -> &GameConfig { &self.config }
//!     fn register_agent(&mut self, _id: u32) {}
//!     fn state(&self) -> Value { serde_json::json!({ "tick": self.tick }) }
//!     fn update(&mut self, _agent_actions: &[AgentAction]) { self.tick += 1; }
//!     fn finished(&self) -> bool { self.tick >= 100 }
//!     fn outcome(&self) -> Outcome { Outcome::new("FINISHED") }
//!     fn scores(&self) -> HashMap<u32, f64> { HashMap::new() }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let engine_config = EngineConfig::new();
//!     let game = YourGame {
//!         config: GameConfig::new("your-game", UpdateMode::Simultaneous),
//!         tick: 0,
//!     };
//!     let specs = vec![AgentSpec { id: 1, path: "./agents/a.sh".into() }];
//!     let engine = MatchEngine::new(game, specs, &engine_config);
//!     let result = engine.run(&Spawner::native_only())?;
//!     println!("{:?}", result.outcome);
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;

pub mod agent;
pub mod channel;
pub mod configuration;
pub mod error;
pub mod game_interface;
pub mod logger;
pub mod match_engine;
pub mod replay;
pub mod spawner;
pub mod supervisor;
pub mod time_accountant;
pub mod wire;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use match_engine::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::EngineConfig;
    pub use crate::error::{EngineError, TaintReason};
    pub use crate::game_interface::{AgentAction, Game, GameConfig, GameFactory, Outcome, UpdateMode};
    pub use crate::match_engine::{AgentScore, AgentSpec, MatchEngine, MatchResult};
    pub use crate::spawner::{ContainerAdapter, Spawner};
}
