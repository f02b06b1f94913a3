//! Scoped recall.

use serde::{Deserialize, Serialize};

use super::{CallContext, MemoryManager};
use crate::digest::recall_hash;
use crate::error::Result;
use crate::events::{MemoryEvent, MemoryTrace, TraceSink};
use crate::item::MemoryItem;
use crate::metrics::METRICS;
use crate::obs;
use crate::scope::{Lane, Space, SpaceContext};

/// Items visible to one call, per store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallContext {
    pub short_term: Vec<MemoryItem>,
    pub semantic: Vec<MemoryItem>,
    pub profile: Vec<MemoryItem>,
}

impl RecallContext {
    /// Short-term, then semantic, then profile.
    pub fn flattened(&self) -> Vec<MemoryItem> {
        self.short_term
            .iter()
            .chain(&self.semantic)
            .chain(&self.profile)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.short_term.len() + self.semantic.len() + self.profile.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallMeta {
    pub session_id: String,
    /// Keys read, in read order.
    pub store_keys: Vec<String>,
    pub recall_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecallOutcome {
    pub context: RecallContext,
    pub events: Vec<MemoryTrace>,
    pub meta: RecallMeta,
}

/// Keys visible to the caller: for each space in read order, the private
/// key, the agent's lane when an agent is named, then the team lane.
pub fn recall_store_keys(space_ctx: &SpaceContext, agent_id: Option<&str>) -> Vec<String> {
    let mut keys = Vec::new();
    for space in Space::READ_ORDER {
        keys.push(space_ctx.private_key(space));
        if let Some(agent) = agent_id {
            keys.push(space_ctx.store_key_for(space, Lane::Agent, Some(agent)));
        }
        keys.push(space_ctx.team_key(space));
    }
    keys
}

impl MemoryManager {
    /// Gather short-term, semantic and profile items for the caller.
    ///
    /// Recall never writes. Rule items are governance state and are left
    /// out; the same stores and inputs always give the same `recall_hash`.
    pub fn recall_context_with_events(&self, call: &CallContext<'_>) -> Result<RecallOutcome> {
        let space_ctx = self.space_context(call);
        let _span = obs::SessionSpan::enter(&space_ctx.session_id);
        let store_keys = recall_store_keys(&space_ctx, call.agent_id);
        let home_key = space_ctx.store_key_for(Space::Session, Lane::Agent, call.agent_id);
        let memory = call.profile.memory;

        let mut context = RecallContext::default();
        if memory.short_term > 0 {
            context.short_term = self.stores.short_term.window(&home_key, memory.short_term);
        }
        if memory.semantic {
            let limit = self.ctx.config.semantic_recall_limit;
            for key in &store_keys {
                context.semantic.extend(
                    self.stores
                        .semantic
                        .recent(key, limit)
                        .into_iter()
                        .filter(|item| item.meta.rule.is_none()),
                );
            }
        }
        if memory.profile {
            for key in &store_keys {
                context
                    .profile
                    .extend(self.stores.profile.items_for_store(key).into_iter().cloned());
            }
        }

        let hash = recall_hash(&context.flattened())?;
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);
        sink.push(MemoryEvent::MemoryRecall {
            store_keys: store_keys.clone(),
            short_term_count: context.short_term.len(),
            semantic_count: context.semantic.len(),
            profile_count: context.profile.len(),
            recall_hash: hash.clone(),
        });

        METRICS.inc_recalls();
        obs::emit_recall(&space_ctx.session_id, context.len(), &hash);
        Ok(RecallOutcome {
            context,
            events: sink.into_traces(),
            meta: RecallMeta {
                session_id: space_ctx.session_id,
                store_keys,
                recall_hash: hash,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentProfile, GovernanceContext};
    use crate::state::StateMap;
    use crate::trust::Identity;

    #[test]
    fn test_store_keys_follow_read_order() {
        let ctx = SpaceContext::new("s1", "alice", "demo");
        let keys = recall_store_keys(&ctx, Some("agent-a"));
        assert_eq!(
            keys,
            vec![
                "session:s1",
                "session:s1:agent:agent-a",
                "session:s1:team",
                "user:alice",
                "user:alice:agent:agent-a",
                "user:alice:team",
                "project:demo",
                "project:demo:agent:agent-a",
                "project:demo:team",
            ]
        );
        assert_eq!(recall_store_keys(&ctx, None).len(), 6);
    }

    #[test]
    fn test_empty_recall_is_stable() {
        let m = MemoryManager::new(GovernanceContext::new("team-1"));
        let profile = AgentProfile::new("assistant");
        let state = StateMap::new();
        let identity = Identity::anonymous();
        let call = CallContext::new(&profile, &state, &identity);
        let a = m.recall_context_with_events(&call).unwrap();
        let b = m.recall_context_with_events(&call).unwrap();
        assert!(a.context.is_empty());
        assert_eq!(a.meta.recall_hash, b.meta.recall_hash);
        assert_eq!(a.events.len(), 1);
        assert_eq!(a.events[0].kind(), "memory_recall");
    }
}
