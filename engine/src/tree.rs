//! Read-only view of a calling tree's ordered levels and membership.
//!
//! The engine snapshots a tree at trigger time and at each escalation; tree
//! edits never retroactively affect an in-flight notification.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{new_id, MemberId, NodeId, TreeId};
use crate::store::{StoreError, StoreResult};

/// Authoring lifecycle of a calling tree. Only `Active` trees can be
/// triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeStatus {
    Draft,
    Active,
    Archived,
}

impl fmt::Display for TreeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// One slot in a calling tree level. The backup member is authoring data
/// only: the engine never fans out to backups on its own, a backup is
/// notified only when the tree author models it as a node of its own.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    pub member_id: MemberId,
    pub position: u32,
    pub backup_member_id: Option<MemberId>,
}

impl TreeNode {
    pub fn new(member_id: &str, position: u32) -> Self {
        Self {
            id: new_id(),
            member_id: member_id.to_string(),
            position,
            backup_member_id: None,
        }
    }

    pub fn with_backup(mut self, member_id: &str) -> Self {
        self.backup_member_id = Some(member_id.to_string());
        self
    }
}

/// An ordered set of recipients contacted together.
#[derive(Debug, Clone)]
pub struct TreeLevel {
    pub level: u32,
    /// Ordered by position.
    pub nodes: Vec<TreeNode>,
}

/// Point-in-time view of a calling tree. Levels are contiguous starting
/// at 1.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub id: TreeId,
    pub name: String,
    pub status: TreeStatus,
    /// Per-level response window; the engine config supplies a default when
    /// absent.
    pub response_window: Option<Duration>,
    pub levels: Vec<TreeLevel>,
}

impl TreeSnapshot {
    pub fn new(name: &str, status: TreeStatus, response_window: Option<Duration>) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            status,
            response_window,
            levels: Vec::new(),
        }
    }

    /// Append the next level, numbering it after the last one.
    pub fn push_level(&mut self, members: &[&str]) -> &mut Self {
        let level = self.levels.len() as u32 + 1;
        let nodes = members
            .iter()
            .enumerate()
            .map(|(i, m)| TreeNode::new(m, i as u32))
            .collect();
        self.levels.push(TreeLevel { level, nodes });
        self
    }

    pub fn total_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Nodes at a level; empty for a level that does not exist.
    pub fn level_nodes(&self, level: u32) -> &[TreeNode] {
        self.levels
            .iter()
            .find(|l| l.level == level)
            .map(|l| l.nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Lowest level with at least one member. Empty leading levels are
    /// skipped deterministically.
    pub fn first_populated_level(&self) -> Option<u32> {
        self.levels
            .iter()
            .find(|l| !l.nodes.is_empty())
            .map(|l| l.level)
    }

    /// Next level after `after` with at least one member, skipping any
    /// empty levels in between.
    pub fn next_populated_level(&self, after: u32) -> Option<u32> {
        self.levels
            .iter()
            .filter(|l| l.level > after && !l.nodes.is_empty())
            .map(|l| l.level)
            .min()
    }

    /// The node at `level` covering the recipient at `position_index` of the
    /// previous level: position-aligned when one exists, else the level's
    /// last node.
    pub fn covering_node(&self, level: u32, position_index: usize) -> Option<&TreeNode> {
        let nodes = self.level_nodes(level);
        nodes.get(position_index).or_else(|| nodes.last())
    }
}

/// Collaborator owning calling-tree data. Consulted at trigger time and at
/// each escalation.
#[async_trait]
pub trait TreeDirectory: Send + Sync {
    /// Snapshot of the tree's ordered levels, or `None` when the tree does
    /// not exist.
    async fn get_levels(&self, tree_id: &str) -> StoreResult<Option<TreeSnapshot>>;
}

/// In-process tree directory, for drills and tests.
#[derive(Default)]
pub struct InMemoryTreeDirectory {
    trees: RwLock<HashMap<TreeId, TreeSnapshot>>,
}

impl InMemoryTreeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tree, returning its id.
    pub fn insert(&self, tree: TreeSnapshot) -> TreeId {
        let id = tree.id.clone();
        self.trees
            .write()
            .expect("tree directory lock poisoned")
            .insert(id.clone(), tree);
        id
    }
}

#[async_trait]
impl TreeDirectory for InMemoryTreeDirectory {
    async fn get_levels(&self, tree_id: &str) -> StoreResult<Option<TreeSnapshot>> {
        let trees = self.trees.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(trees.get(tree_id).cloned())
    }
}
