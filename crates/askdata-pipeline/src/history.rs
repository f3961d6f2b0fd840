//! In-memory per-thread turn history.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use askdata_core::{ConversationTurn, Result, TurnHistoryStore};

type Thread = Arc<Mutex<VecDeque<ConversationTurn>>>;

/// Keyed history store. Each thread has its own lock, so appends to one
/// thread never block another and appends within a thread are serialized.
#[derive(Clone, Default)]
pub struct MemoryTurnHistory {
    threads: Arc<RwLock<HashMap<String, Thread>>>,
}

impl MemoryTurnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn thread(&self, thread_id: &str) -> Thread {
        if let Some(thread) = self.threads.read().await.get(thread_id) {
            return thread.clone();
        }
        self.threads
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    /// Number of threads with at least one recorded turn.
    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl TurnHistoryStore for MemoryTurnHistory {
    async fn recent(&self, thread_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let Some(thread) = self.threads.read().await.get(thread_id).cloned() else {
            return Ok(Vec::new());
        };
        let turns = thread.lock().await;
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.iter().skip(skip).cloned().collect())
    }

    async fn append(
        &self,
        thread_id: &str,
        turn: ConversationTurn,
        max_turns: usize,
    ) -> Result<()> {
        let thread = self.thread(thread_id).await;
        let mut turns = thread.lock().await;
        turns.push_back(turn);
        let mut evicted = 0;
        while turns.len() > max_turns {
            turns.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(thread_id, evicted, max_turns, "Evicted oldest turns");
        }
        Ok(())
    }
}
