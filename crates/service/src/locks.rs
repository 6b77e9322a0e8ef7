//! Per-board commit locks.

use std::collections::HashMap;
use std::sync::Arc;

use burndown_core::BoardId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per board, created on first use and pruned once idle.
///
/// Share a single instance between every trigger (scheduled job, user
/// request, alert acknowledgement) that may commit for the same board.
#[derive(Debug, Default)]
pub struct BoardLocks {
    locks: Mutex<HashMap<BoardId, Arc<Mutex<()>>>>,
}

impl BoardLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `board_id`.
    pub async fn lock(&self, board_id: &BoardId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on are dropped so the table tracks active boards
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(board_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of boards currently tracked (locked, awaited, or not yet pruned).
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Whether no board is tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
