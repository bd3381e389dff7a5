use super::types::{Role, Turn};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Persistence collaborator: receives every finalized message exactly once.
pub trait TurnSink: Send + Sync {
    fn append_turn(&self, role: Role, text: &str, timestamp: DateTime<Utc>);
}

/// In-memory conversation log
#[derive(Debug, Clone)]
pub struct TurnStore {
    turns: Arc<RwLock<Vec<Turn>>>,
}

impl TurnStore {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn get_all(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    pub fn last(&self) -> Option<Turn> {
        self.turns.read().last().cloned()
    }

    pub fn by_role(&self, role: Role) -> Vec<Turn> {
        self.turns
            .read()
            .iter()
            .filter(|t| t.role == role)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.turns.write().clear();
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }
}

impl TurnSink for TurnStore {
    fn append_turn(&self, role: Role, text: &str, timestamp: DateTime<Utc>) {
        self.turns.write().push(Turn::new(role, text, timestamp));
    }
}

impl Default for TurnStore {
    fn default() -> Self {
        Self::new()
    }
}
