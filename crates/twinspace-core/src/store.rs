use crate::item::{Item, ItemPatch};
use crate::key::{ItemKey, OperationId, UserKey};
use crate::operation::OperationRecord;
use crate::user::{Role, User};

/// Errors from the backing store. Failed multi-step mutations roll
/// back; a partially committed edge or record is never observable.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Keyed storage of item records plus the parent→child adjacency.
pub trait ItemStore: Send + Sync {
    /// Look up an item by composite key.
    fn find_by_key(&self, key: &ItemKey) -> Result<Option<Item>, StoreError>;

    /// Insert or replace an item record. Edges are managed separately
    /// through `add_edge`; the saved item's `children` field is ignored.
    fn save(&self, item: &Item) -> Result<(), StoreError>;

    /// All stored items, insertion order.
    fn find_all(&self) -> Result<Vec<Item>, StoreError>;

    /// Fetch-merge-save in a single transaction: the present patch
    /// fields replace the stored ones, everything else is left as read.
    /// Fails `NotFound` when the key does not resolve.
    fn merge(&self, key: &ItemKey, patch: ItemPatch) -> Result<Item, StoreError>;

    /// Add a directed parent→child edge. Idempotent: the adjacency has
    /// set semantics. Both endpoints are checked and the edge inserted
    /// inside one transaction; a missing endpoint is `NotFound`.
    fn add_edge(&self, parent: &ItemKey, child: &ItemKey) -> Result<(), StoreError>;

    /// Items the parent has an outgoing edge to. Edges whose target no
    /// longer exists are skipped.
    fn children_of(&self, parent: &ItemKey) -> Result<Vec<Item>, StoreError>;

    /// Items holding an edge to the given child (reverse index).
    fn parents_of(&self, child: &ItemKey) -> Result<Vec<Item>, StoreError>;

    /// Administrative purge of all items and edges.
    fn delete_all(&self) -> Result<(), StoreError>;
}

/// Keyed storage of user accounts.
pub trait UserStore: Send + Sync {
    fn find_by_key(&self, key: &UserKey) -> Result<Option<User>, StoreError>;

    /// Insert or replace a user record.
    fn save(&self, user: &User) -> Result<(), StoreError>;

    /// One zero-indexed page, ordered by (username, key) descending.
    fn page(&self, size: usize, page: usize) -> Result<Vec<User>, StoreError>;

    /// Same paging contract, filtered by role.
    fn page_by_role(&self, role: Role, size: usize, page: usize) -> Result<Vec<User>, StoreError>;

    fn delete_all(&self) -> Result<(), StoreError>;
}

/// Append-only storage of operation records.
pub trait OperationStore: Send + Sync {
    fn save(&self, record: &OperationRecord) -> Result<(), StoreError>;

    /// One zero-indexed page, newest first.
    fn page(&self, size: usize, page: usize) -> Result<Vec<OperationRecord>, StoreError>;

    /// Remove one record. Used to back out a record whose enqueue was
    /// rejected; removing an absent record is a no-op.
    fn delete(&self, id: &OperationId) -> Result<(), StoreError>;

    fn delete_all(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::AlreadyExists("t1/abc".into());
        assert!(err.to_string().contains("t1/abc"));

        let err = StoreError::Storage("begin tx: locked".into());
        assert!(err.to_string().contains("locked"));
    }
}
