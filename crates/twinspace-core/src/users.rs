use std::sync::Arc;

use crate::error::{Error, Result};
use crate::key::UserKey;
use crate::store::UserStore;
use crate::user::{Role, User};

/// Caller-supplied draft of a new account. The key is assembled from
/// the server's configured space plus the draft email.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserDraft {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    pub role: Role,
}

/// Mutable half of a user record. Applied as a full overwrite; the key
/// never changes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserUpdate {
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    pub role: Role,
}

/// Account registration, login, profile updates, and the role-gated
/// listing endpoints.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    space: String,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, space: impl Into<String>) -> Self {
        Self {
            store,
            space: space.into(),
        }
    }

    fn not_found(key: &UserKey) -> Error {
        Error::NotFound(format!("user {}", key))
    }

    /// Register a new account. Fails if the key is already taken.
    pub fn register(&self, draft: UserDraft) -> Result<User> {
        let user = User {
            key: UserKey::new(self.space.clone(), draft.email),
            username: draft.username,
            avatar: draft.avatar,
            role: draft.role,
        };
        user.validate()?;
        if self.store.find_by_key(&user.key)?.is_some() {
            return Err(Error::AlreadyExists(format!("user {}", user.key)));
        }
        self.store.save(&user)?;
        tracing::info!(key = %user.key, role = %user.role, "user registered");
        Ok(user)
    }

    /// Fetch the account for a login attempt.
    pub fn login(&self, key: &UserKey) -> Result<User> {
        self.store
            .find_by_key(key)?
            .ok_or_else(|| Self::not_found(key))
    }

    /// Overwrite the mutable fields of an existing account.
    pub fn update(&self, key: &UserKey, update: UserUpdate) -> Result<User> {
        let existing = self
            .store
            .find_by_key(key)?
            .ok_or_else(|| Self::not_found(key))?;

        let user = User {
            key: existing.key,
            username: update.username,
            avatar: update.avatar,
            role: update.role,
        };
        user.validate()?;
        self.store.save(&user)?;
        tracing::debug!(key = %user.key, "user updated");
        Ok(user)
    }

    /// One page of all accounts, ordered by (username, key) descending.
    /// Only admins may enumerate the user base.
    pub fn list_users(&self, acting: &UserKey, size: usize, page: usize) -> Result<Vec<User>> {
        self.require_role(acting, Role::Admin)?;
        if size == 0 {
            return Err(Error::Validation("page size must be positive".into()));
        }
        Ok(self.store.page(size, page)?)
    }

    /// Same paging contract filtered by role. Ungated.
    pub fn list_by_role(&self, role: Role, size: usize, page: usize) -> Result<Vec<User>> {
        if size == 0 {
            return Err(Error::Validation("page size must be positive".into()));
        }
        Ok(self.store.page_by_role(role, size, page)?)
    }

    /// Administrative purge of every account, the acting admin included.
    pub fn delete_all(&self, admin: &UserKey) -> Result<()> {
        self.require_role(admin, Role::Admin)?;
        self.store.delete_all()?;
        tracing::warn!(admin = %admin, "all users purged");
        Ok(())
    }

    /// Resolve the acting user and check their role. A missing account
    /// is NotFound; a present account with the wrong role is
    /// AccessDenied.
    pub fn require_role(&self, acting: &UserKey, role: Role) -> Result<User> {
        let user = self
            .store
            .find_by_key(acting)?
            .ok_or_else(|| Self::not_found(acting))?;
        if user.role != role {
            return Err(Error::AccessDenied(format!(
                "user {} is {}, needs {}",
                user.key, user.role, role
            )));
        }
        Ok(user)
    }
}
