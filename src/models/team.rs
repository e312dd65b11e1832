use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Membership permission tier within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Owner,
    Admin,
    Member,
    Guest,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
            TeamRole::Guest => "guest",
        }
    }
}

/// A named collaboration workspace. The owner is recorded redundantly both
/// here and as a role=owner membership row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    /// Opaque shared token; regeneration permanently invalidates prior links.
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join row mapping a user to a team. (team_id, user_id) is unique: a user
/// holds at most one role per team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub member_id: String,
    pub team_id: String,
    pub user_id: String,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}
