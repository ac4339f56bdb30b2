//! Config for the match engine's own behavior.
//!
//! This module provides configuration for the engine — timing defaults, logging and
//! replay output — never for a specific game's rules. A game's own options travel
//! through [`crate::game_interface::GameConfig`] instead.
//!
//! Configuration can be created programmatically using [`EngineConfig::new()`] or by
//! reading environment variables using [`EngineConfig::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional, and case-insensitive. Set the value to `"true"` to enable a flag.
//!
//! - `MATCH_ENGINE_VERBOSE` — Enable verbose console output (default: `true`)
//! - `MATCH_ENGINE_LOG_DIR` — Enable logging to a directory (must be a valid directory path)
//! - `MATCH_ENGINE_DEBUG_AGENT_STDERR` — Log agent stderr at debug level (default: `false`)
//! - `MATCH_ENGINE_REPLAY_DIR` — Directory replay journals are written into (default: `.`)

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the match engine's own behavior (not a specific game's rules).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub(crate) verbose: bool,
    pub(crate) log_dir: Option<PathBuf>,
    pub(crate) debug_agent_stderr: bool,
    pub(crate) replay_dir: PathBuf,
    pub(crate) default_step_time_limit: Duration,
    pub(crate) default_step_limit_pool: Duration,
    pub(crate) start_deadline: Duration,
    pub(crate) max_errors: usize,
}

/// Default value for `errors.count > MAX_ERRORS` (§4.2).
pub const DEFAULT_MAX_ERRORS: usize = 10;

impl EngineConfig {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The engine prints match progress to stdout.
    /// - Logging is disabled (no log directory set).
    /// - Agent stderr is discarded rather than logged.
    /// - Replay journals are written into the current directory.
    /// - `step_time_limit` defaults to 200ms, `step_limit_pool` to 10s, and the start
    ///   deadline (for booting slow, e.g. containerized, agents) to 10s.
    /// - An agent taints after more than 10 recorded protocol errors.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log_dir: None,
            debug_agent_stderr: false,
            replay_dir: PathBuf::from("."),
            default_step_time_limit: Duration::from_millis(200),
            default_step_limit_pool: Duration::from_secs(10),
            start_deadline: Duration::from_secs(10),
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// The following environment variables are recognized:
    /// - `MATCH_ENGINE_VERBOSE`: if set to `"true"`, enables verbose output (default: `true`)
    /// - `MATCH_ENGINE_LOG_DIR`: if set, enables logging to the given directory path
    /// - `MATCH_ENGINE_DEBUG_AGENT_STDERR`: if set to `"true"`, logs agent stderr (default: `false`)
    /// - `MATCH_ENGINE_REPLAY_DIR`: if set, overrides the replay output directory
    ///
    /// Any other value (including unset) will result in using the default value for each field.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        let log_dir = std::env::var("MATCH_ENGINE_LOG_DIR")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.is_dir());

        let replay_dir = std::env::var("MATCH_ENGINE_REPLAY_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            verbose: get_env_flag("MATCH_ENGINE_VERBOSE", true),
            log_dir,
            debug_agent_stderr: get_env_flag("MATCH_ENGINE_DEBUG_AGENT_STDERR", false),
            replay_dir,
            ..Self::new()
        }
    }

    /// Enable or disable verbose console output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable logging to the given directory path.
    ///
    /// # Panics
    ///
    /// This method will panic if the provided path is not a valid directory.
    pub fn with_log<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            std::fs::create_dir(path)
                .unwrap_or_else(|_| panic!("Could not create directory {}", path.display()));
        }

        if !path.is_dir() {
            panic!("Logging path must be a valid directory: {}", path.display());
        }

        self.log_dir = Some(path.to_path_buf());
        self
    }

    /// Set the directory replay journals are written into.
    pub fn with_replay_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.replay_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the default per-step soft limit used when a game doesn't specify one.
    pub fn with_default_step_time_limit(mut self, value: Duration) -> Self {
        self.default_step_time_limit = value;
        self
    }

    /// Set the default cumulative overtime pool used when a game doesn't specify one.
    pub fn with_default_step_limit_pool(mut self, value: Duration) -> Self {
        self.default_step_limit_pool = value;
        self
    }

    /// Set the deadline allowed for an agent to boot and acknowledge `set_agent_id`.
    pub fn with_start_deadline(mut self, value: Duration) -> Self {
        self.start_deadline = value;
        self
    }

    /// Set how many recorded protocol errors an agent may accumulate before TOO_MANY_ERRORS.
    pub fn with_max_errors(mut self, value: usize) -> Self {
        self.max_errors = value;
        self
    }

    /// Enable or disable logging of agent stderr at debug level.
    pub fn with_debug_agent_stderr(mut self, value: bool) -> Self {
        self.debug_agent_stderr = value;
        self
    }

    /// Returns true if logging is enabled (i.e., a log directory is set).
    pub(crate) fn is_logging_enabled(&self) -> bool {
        self.log_dir.is_some()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
