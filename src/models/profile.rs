use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a user record. The stored document also carries the bcrypt
/// password hash; that field only exists on the auth module's private struct
/// so it can never be serialized out of a read endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
