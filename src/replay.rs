//! The replay journal (§4.5): an append-only, newline-delimited JSON file recording
//! every tick of a match for the external renderer and post-match analysis.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// One line of the replay journal, matching the keys listed in §3.
#[derive(Debug, Serialize)]
pub struct ReplayRecord<'a> {
    pub config: &'a Value,
    pub epoch: u64,
    pub max_epoch: Option<u64>,
    pub world_state: &'a Value,
    pub agent_actions: &'a Value,
    pub agent_ids: &'a [u32],
}

/// Appends one JSON object per tick to a file, opened lazily on first write so a match
/// that never ticks never creates an empty journal.
pub struct ReplayJournal {
    path: PathBuf,
    file: Option<File>,
}

const SUFFIX_LEN: usize = 8;

impl ReplayJournal {
    /// Derive a journal path from `game_name` under `dir`, with a random suffix so
    /// concurrent matches on the same game never collide.
    pub fn new(dir: &Path, game_name: &str) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        let filename = format!("{game_name}-{suffix}.ndjson");
        ReplayJournal {
            path: dir.join(filename),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> anyhow::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().expect("just initialized"))
    }

    /// Append one tick's record, flushing immediately.
    pub fn write_record(&mut self, record: &ReplayRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record)?;
        let path = self.path.clone();
        let file = self.file()?;
        writeln!(file, "{line}")?;
        file.flush()?;
        trace!(path = %path.display(), epoch = record.epoch, "replay record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn lazy_open_creates_nothing_until_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ReplayJournal::new(dir.path(), "snake");
        assert!(!journal.path().exists());
    }

    #[test]
    fn writes_flush_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = ReplayJournal::new(dir.path(), "snake");
        let config = serde_json::json!({"game_name": "snake"});
        let world_state = serde_json::json!({"tick": 0});
        let agent_actions = serde_json::json!([]);
        let agent_ids = [1, 2];

        journal
            .write_record(&ReplayRecord {
                config: &config,
                epoch: 0,
                max_epoch: Some(100),
                world_state: &world_state,
                agent_actions: &agent_actions,
                agent_ids: &agent_ids,
            })
            .unwrap();

        let contents = fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["epoch"], 0);
        assert_eq!(parsed["agent_ids"], serde_json::json!([1, 2]));
    }

    #[test]
    fn distinct_journals_for_same_game_name_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = ReplayJournal::new(dir.path(), "snake");
        let b = ReplayJournal::new(dir.path(), "snake");
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn reads_back_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = ReplayJournal::new(dir.path(), "snake");
        let config = serde_json::json!({});
        let world_state = serde_json::json!({});
        let agent_actions = serde_json::json!([]);
        let agent_ids = [1];
        for epoch in 0..3 {
            journal
                .write_record(&ReplayRecord {
                    config: &config,
                    epoch,
                    max_epoch: None,
                    world_state: &world_state,
                    agent_actions: &agent_actions,
                    agent_ids: &agent_ids,
                })
                .unwrap();
        }
        let file = File::open(journal.path()).unwrap();
        let count = std::io::BufReader::new(file).lines().count();
        assert_eq!(count, 3);
    }
}
