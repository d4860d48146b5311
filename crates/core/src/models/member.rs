//! Member model - a person wearing a badge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Member belongs to a Project and owns a badge; (badge, project) is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub key: String,
    pub project_id: Uuid,
    /// Hub-readable badge identifier
    pub badge: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn new(project_id: Uuid, badge: String, name: String, key: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            key,
            project_id,
            badge,
            name,
            email: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn to_ref(&self) -> MemberRef {
        MemberRef {
            key: self.key.clone(),
            badge: self.badge.clone(),
            name: self.name.clone(),
        }
    }
}

/// Lightweight reference returned from registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub key: String,
    pub badge: String,
    pub name: String,
}
