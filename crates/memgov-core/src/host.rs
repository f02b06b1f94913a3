//! One manager per session behind an async mutex.
//!
//! A [`MemoryManager`] is single-threaded by construction. [`SessionHost`]
//! hands every session id its own manager, so operations on one session are
//! serialised while different sessions proceed in parallel.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::config::GovernanceContext;
use crate::manager::MemoryManager;

pub type SharedManager = Arc<Mutex<MemoryManager>>;

#[derive(Debug)]
pub struct SessionHost {
    ctx: GovernanceContext,
    sessions: RwLock<BTreeMap<String, SharedManager>>,
}

impl SessionHost {
    pub fn new(ctx: GovernanceContext) -> Self {
        Self {
            ctx,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn context(&self) -> &GovernanceContext {
        &self.ctx
    }

    /// The session's manager, created on first use.
    pub async fn session(&self, session_id: &str) -> SharedManager {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id = %session_id, "session manager created");
            Arc::new(Mutex::new(MemoryManager::new(self.ctx.clone())))
        });
        Arc::clone(entry)
    }

    /// Run `f` with exclusive access to the session's manager.
    pub async fn with_session<F, R>(&self, session_id: &str, f: F) -> R
    where
        F: FnOnce(&mut MemoryManager) -> R,
    {
        let manager = self.session(session_id).await;
        let mut guard = manager.lock().await;
        f(&mut guard)
    }

    /// Drop a session. Handles already given out stay usable.
    pub async fn close(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
