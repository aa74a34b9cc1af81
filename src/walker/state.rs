//! Persisted crawl state and fork memory

use crate::classify::ClassifiedAnomaly;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How pending forks are remembered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkPolicy {
    /// Every pending fork is kept; the most recent is resumed first
    #[default]
    Stack,

    /// Only the most recent fork is kept; older ones are recovered by
    /// ascending through parent directories
    SingleSlot,
}

/// Directories that still had more than one unvisited child when listed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkMemory {
    policy: ForkPolicy,
    pending: Vec<String>,
}

impl ForkMemory {
    pub fn new(policy: ForkPolicy) -> Self {
        Self {
            policy,
            pending: Vec::new(),
        }
    }

    pub fn policy(&self) -> ForkPolicy {
        self.policy
    }

    /// Change policy in place; going to `SingleSlot` keeps only the most
    /// recent fork
    pub fn set_policy(&mut self, policy: ForkPolicy) {
        if policy == ForkPolicy::SingleSlot && self.pending.len() > 1 {
            self.pending.drain(..self.pending.len() - 1);
        }
        self.policy = policy;
    }

    /// Remember a fork
    ///
    /// With `SingleSlot` this overwrites whatever was remembered before.
    pub fn remember(&mut self, url: &str) {
        if self.policy == ForkPolicy::SingleSlot {
            self.pending.clear();
        }
        if self.pending.last().map(String::as_str) != Some(url) {
            self.pending.push(url.to_string());
        }
    }

    /// Take the most recent fork, clearing it
    pub fn take(&mut self) -> Option<String> {
        self.pending.pop()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending forks, oldest first
    pub fn pending(&self) -> &[String] {
        &self.pending
    }
}

/// Everything needed to resume a crawl after a crash
///
/// Owned by exactly one walker; written to the checkpoint store after every
/// directory step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlState {
    /// Directory the crawl started from
    pub start_url: String,

    /// Directory to list next
    pub current_url: String,

    /// Directories whose children have been listed and processed
    pub visited: BTreeSet<String>,

    /// Directories with nothing left to return to
    pub empty: BTreeSet<String>,

    /// Pending forks
    pub forks: ForkMemory,

    /// Rows found so far, in discovery order
    pub anomalies: Vec<ClassifiedAnomaly>,

    /// True once the walk reached its end
    pub completed: bool,
}

impl CrawlState {
    /// Fresh state positioned at `start_url`
    pub fn new(start_url: &str, policy: ForkPolicy) -> Self {
        Self {
            start_url: start_url.to_string(),
            current_url: start_url.to_string(),
            forks: ForkMemory::new(policy),
            ..Default::default()
        }
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn is_empty_subtree(&self, url: &str) -> bool {
        self.empty.contains(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_keeps_every_fork() {
        let mut forks = ForkMemory::new(ForkPolicy::Stack);
        forks.remember("https://h/a/");
        forks.remember("https://h/a/b/");
        forks.remember("https://h/a/b/");
        assert_eq!(forks.len(), 2);
        assert_eq!(forks.take().as_deref(), Some("https://h/a/b/"));
        assert_eq!(forks.take().as_deref(), Some("https://h/a/"));
        assert_eq!(forks.take(), None);
    }

    #[test]
    fn test_single_slot_overwrites() {
        let mut forks = ForkMemory::new(ForkPolicy::SingleSlot);
        forks.remember("https://h/a/");
        forks.remember("https://h/a/b/");
        assert_eq!(forks.pending(), ["https://h/a/b/".to_string()]);
        assert_eq!(forks.take().as_deref(), Some("https://h/a/b/"));
        assert!(forks.is_empty());
    }

    #[test]
    fn test_switch_policy() {
        let mut forks = ForkMemory::new(ForkPolicy::Stack);
        forks.remember("https://h/a/");
        forks.remember("https://h/a/b/");

        forks.set_policy(ForkPolicy::SingleSlot);
        assert_eq!(forks.policy(), ForkPolicy::SingleSlot);
        assert_eq!(forks.pending(), ["https://h/a/b/".to_string()]);

        forks.set_policy(ForkPolicy::Stack);
        forks.remember("https://h/c/");
        assert_eq!(forks.len(), 2);
    }

    #[test]
    fn test_state_serde() {
        let mut state = CrawlState::new("https://h/root/", ForkPolicy::SingleSlot);
        state.visited.insert("https://h/root/".into());
        state.forks.remember("https://h/root/");

        let json = serde_json::to_string(&state).unwrap();
        let back: CrawlState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.forks.policy(), ForkPolicy::SingleSlot);
    }
}
