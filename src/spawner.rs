//! Process spawning for agents (§4.6): native child processes by default, or a
//! containerized channel bridged by an externally supplied [`ContainerAdapter`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::channel::LineChannel;

/// How an agent's process is reached, read from an optional `manifest.json` sitting
/// beside the entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentChannel {
    #[default]
    Stdio,
    Http,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    agent_channel: AgentChannel,
}

/// Reads `manifest.json` next to `entry_point`, if present. A missing manifest is
/// equivalent to `{"agent_channel": "STDIO"}`.
fn read_manifest(entry_point: &Path) -> anyhow::Result<Manifest> {
    let manifest_path = entry_point
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("manifest.json");

    if !manifest_path.exists() {
        return Ok(Manifest::default());
    }

    let raw = fs::read_to_string(&manifest_path)?;
    let manifest: Manifest = serde_json::from_str(&raw)?;
    Ok(manifest)
}

/// Bridges a containerized agent's HTTP endpoint into a [`LineChannel`]-compatible
/// handle. Implemented outside this crate; the core never hard-codes a container
/// runtime (§4.6).
pub trait ContainerAdapter: Send + Sync {
    /// Build and start a container for the agent at `entry_point`, returning a channel
    /// whose `send`/`recv` are bridged to the container's HTTP endpoint.
    fn spawn(&self, entry_point: &Path, id: u32) -> anyhow::Result<LineChannel>;
}

/// Resolves an agent's entry point to a live [`LineChannel`], consulting the agent's
/// manifest to decide between a native child process and a containerized one.
pub struct Spawner {
    container_adapter: Option<Box<dyn ContainerAdapter>>,
}

impl Spawner {
    /// A spawner that only supports native, STDIO-channel agents.
    pub fn native_only() -> Self {
        Spawner {
            container_adapter: None,
        }
    }

    /// A spawner that delegates HTTP-channel manifests to `adapter`.
    pub fn with_container_adapter(adapter: Box<dyn ContainerAdapter>) -> Self {
        Spawner {
            container_adapter: Some(adapter),
        }
    }

    /// Spawn the agent at `entry_point` for agent id `id`. `debug_agent_stderr` gates
    /// whether a native agent's stderr is logged at debug level (§2a); it has no
    /// effect on the HTTP/container path, which is bridged by the supplied adapter.
    pub fn spawn(&self, entry_point: &Path, id: u32, debug_agent_stderr: bool) -> anyhow::Result<LineChannel> {
        let manifest = read_manifest(entry_point)?;
        match manifest.agent_channel {
            AgentChannel::Stdio => spawn_native(entry_point, debug_agent_stderr),
            AgentChannel::Http => match &self.container_adapter {
                Some(adapter) => adapter.spawn(entry_point, id),
                None => anyhow::bail!(
                    "agent at {} declares an HTTP channel but no ContainerAdapter was supplied",
                    entry_point.display()
                ),
            },
        }
    }

    /// Tear down an agent's channel, killing its process if still running (§4.6).
    /// `LineChannel`'s `Drop` impl already does this; `kill` just gives that teardown
    /// an explicit, discoverable name on the spawner's surface.
    pub fn kill(&self, channel: LineChannel) {
        drop(channel);
    }
}

/// Spawn the entry point directly as a child process, connected over stdio.
fn spawn_native(entry_point: &Path, debug_agent_stderr: bool) -> anyhow::Result<LineChannel> {
    let entry_point: PathBuf = entry_point.to_path_buf();
    LineChannel::spawn(&entry_point, &[], debug_agent_stderr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_defaults_to_stdio() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("agent.sh");
        std::fs::write(&entry, "#!/bin/sh\n").unwrap();
        let manifest = read_manifest(&entry).unwrap();
        assert_eq!(manifest.agent_channel, AgentChannel::Stdio);
    }

    #[test]
    fn manifest_selects_http_channel() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("agent.sh");
        std::fs::write(&entry, "#!/bin/sh\n").unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"agent_channel": "HTTP"}"#,
        )
        .unwrap();
        let manifest = read_manifest(&entry).unwrap();
        assert_eq!(manifest.agent_channel, AgentChannel::Http);
    }

    #[test]
    fn http_channel_without_adapter_errors() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("agent.sh");
        std::fs::write(&entry, "#!/bin/sh\n").unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"agent_channel": "HTTP"}"#,
        )
        .unwrap();

        let spawner = Spawner::native_only();
        let err = spawner.spawn(&entry, 1, false).unwrap_err();
        assert!(err.to_string().contains("ContainerAdapter"));
    }

    #[test]
    fn kill_tears_down_a_still_running_child() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("agent.sh");
        std::fs::write(&entry, "#!/bin/sh\nsleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&entry).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&entry, perms).unwrap();

        let spawner = Spawner::native_only();
        let channel = spawner.spawn(&entry, 1, false).unwrap();
        spawner.kill(channel);
    }
}
