//! Member-level change actions submitted with a change token

use serde::{Deserialize, Serialize};

/// Action applied to one member of a remote collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    /// Add the member
    Insert,
    /// Remove the member
    Delete,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Insert => write!(f, "insert"),
            ChangeAction::Delete => write!(f, "delete"),
        }
    }
}

/// A single insert or delete of a member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberChange<M> {
    pub action: ChangeAction,
    pub member: M,
}

impl<M> MemberChange<M> {
    pub fn insert(member: M) -> Self {
        Self {
            action: ChangeAction::Insert,
            member,
        }
    }

    pub fn delete(member: M) -> Self {
        Self {
            action: ChangeAction::Delete,
            member,
        }
    }
}

/// Build one batch of `action` changes for the given members
pub fn batch<M: Clone>(action: ChangeAction, members: &[M]) -> Vec<MemberChange<M>> {
    members
        .iter()
        .cloned()
        .map(|member| MemberChange { action, member })
        .collect()
}

/// Summary of the member changes a single update submitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub inserted: usize,
    pub deleted: usize,
    /// Number of token-carrying mutations it took
    pub mutations: usize,
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to insert, {} to delete, {} mutations",
            self.inserted, self.deleted, self.mutations
        )
    }
}
