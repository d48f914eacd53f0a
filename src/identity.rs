use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access role of an authenticated caller. Admin and Manager see sensitive
/// values in the clear; Analyst reads are masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Analyst,
}

impl Role {
    pub fn sees_clear_values(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Analyst => "ANALYST",
        }
    }
}

/// Authenticated identity handed in by the surrounding service. Session
/// issuance happens outside this crate; every operation is scoped to the
/// caller's own records.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}
