use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::key::UserKey;

/// Access role of a user within its space. ADMIN is privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Player,
    Manager,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Player => write!(f, "PLAYER"),
            Role::Manager => write!(f, "MANAGER"),
            Role::Admin => write!(f, "ADMIN"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAYER" => Ok(Role::Player),
            "MANAGER" => Ok(Role::Manager),
            "ADMIN" => Ok(Role::Admin),
            other => Err(Error::Validation(format!("invalid role: {}", other))),
        }
    }
}

/// A user account. The key never changes; username, avatar, and role
/// are replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub key: UserKey,
    pub username: String,
    pub avatar: String,
    pub role: Role,
}

impl User {
    /// Validate the mutable fields of a user record.
    pub fn validate(&self) -> Result<(), Error> {
        if self.key.email.is_empty() || !self.key.email.contains('@') {
            return Err(Error::Validation(format!(
                "invalid email: {:?}",
                self.key.email
            )));
        }
        if self.username.is_empty() {
            return Err(Error::Validation("username must not be empty".into()));
        }
        Ok(())
    }
}
