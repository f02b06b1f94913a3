//! Scoping resolver: (space, lane, owner, agent) to store key.
//!
//! Key shapes:
//!
//! | Lane  | Agent   | Key                              |
//! |-------|---------|----------------------------------|
//! | agent | none    | `{space}:{owner}`                |
//! | agent | `a`     | `{space}:{owner}:agent:{a}`      |
//! | team  | ignored | `{space}:{owner}:team`           |
//!
//! Owner and agent components have `%` and `:` percent-escaped, which keeps
//! the mapping injective even for owners that contain separators.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::GovernanceContext;
use crate::state::{self, StateMap};
use crate::trust::Identity;

/// Coarse memory partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Space {
    Session,
    Project,
    User,
}

impl Space {
    /// Recall consults spaces in this order.
    pub const READ_ORDER: [Space; 3] = [Space::Session, Space::User, Space::Project];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Project => "project",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Space {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "project" => Ok(Self::Project),
            "user" => Ok(Self::User),
            other => Err(format!("unknown space: {other}")),
        }
    }
}

/// Ownership axis within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Private to one agent, or to the caller when no agent is named.
    Agent,
    /// Shared by every agent of the team.
    Team,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Team => "team",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" | "my" => Ok(Self::Agent),
            "team" => Ok(Self::Team),
            other => Err(format!("unknown lane: {other}")),
        }
    }
}

fn escape_component(raw: &str) -> Cow<'_, str> {
    if raw.contains(['%', ':']) {
        Cow::Owned(raw.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Pure store-key function. Same inputs always give the same key.
pub fn store_key_for(space: Space, lane: Lane, owner: &str, agent_id: Option<&str>) -> String {
    let owner = escape_component(owner);
    match (lane, agent_id) {
        (Lane::Team, _) => format!("{space}:{owner}:team"),
        (Lane::Agent, Some(agent)) => {
            format!("{space}:{owner}:agent:{}", escape_component(agent))
        }
        (Lane::Agent, None) => format!("{space}:{owner}"),
    }
}

/// Resolved owners for one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceContext {
    pub session_id: String,
    pub user_id: String,
    pub project_id: String,
}

impl SpaceContext {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Resolve owners from the interpreter state, identity and governance context.
    pub fn resolve(state: &StateMap, identity: &Identity, ctx: &GovernanceContext) -> Self {
        let session_id = state::session_id(state).unwrap_or_else(|| "anon".to_string());
        Self {
            session_id,
            user_id: identity.actor_id(),
            project_id: ctx.project_id(),
        }
    }

    pub fn owner_for(&self, space: Space) -> &str {
        match space {
            Space::Session => &self.session_id,
            Space::User => &self.user_id,
            Space::Project => &self.project_id,
        }
    }

    pub fn store_key_for(&self, space: Space, lane: Lane, agent_id: Option<&str>) -> String {
        store_key_for(space, lane, self.owner_for(space), agent_id)
    }

    /// The caller's private key in `space`.
    pub fn private_key(&self, space: Space) -> String {
        self.store_key_for(space, Lane::Agent, None)
    }

    pub fn team_key(&self, space: Space) -> String {
        self.store_key_for(space, Lane::Team, None)
    }
}

/// Private key of `agent_id` in `space`.
pub fn agent_lane_key(ctx: &SpaceContext, space: Space, agent_id: &str) -> String {
    ctx.store_key_for(space, Lane::Agent, Some(agent_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_key_shapes() {
        let ctx = SpaceContext::new("anon", "owner-1", "demo");
        assert_eq!(ctx.private_key(Space::Session), "session:anon");
        assert_eq!(ctx.team_key(Space::Project), "project:demo:team");
        assert_eq!(
            agent_lane_key(&ctx, Space::Project, "agent-a"),
            "project:demo:agent:agent-a"
        );
    }

    #[test]
    fn test_team_key_ignores_agent() {
        let with_agent = store_key_for(Space::Project, Lane::Team, "demo", Some("agent-a"));
        let without = store_key_for(Space::Project, Lane::Team, "demo", None);
        assert_eq!(with_agent, without);
    }

    #[test]
    fn test_keys_are_injective_with_separators_in_owner() {
        let keys: BTreeSet<String> = [
            store_key_for(Space::Session, Lane::Agent, "a:team", None),
            store_key_for(Space::Session, Lane::Team, "a", None),
            store_key_for(Space::Session, Lane::Agent, "a", Some("x")),
            store_key_for(Space::Session, Lane::Agent, "a:agent:x", None),
            store_key_for(Space::Session, Lane::Agent, "a%3Ateam", None),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_space_and_lane_parse() {
        assert_eq!("Project".parse::<Space>().unwrap(), Space::Project);
        assert_eq!("team".parse::<Lane>().unwrap(), Lane::Team);
        assert!("galaxy".parse::<Space>().is_err());
    }
}
