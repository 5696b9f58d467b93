use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::item::{Item, ItemPatch};
use crate::key::{ItemKey, UserKey};
use crate::store::ItemStore;
use crate::user::Role;
use crate::users::UserService;
use crate::value::Attributes;

/// Caller-supplied draft of a new item. Key, creation timestamp, and
/// creator are server-assigned.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ItemDraft {
    pub item_type: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    pub location: Option<crate::item::Location>,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Item lifecycle: creation, partial update, fetch, and the
/// parent/child graph operations.
#[derive(Clone)]
pub struct ItemService {
    store: Arc<dyn ItemStore>,
    space: String,
}

impl ItemService {
    pub fn new(store: Arc<dyn ItemStore>, space: impl Into<String>) -> Self {
        Self {
            store,
            space: space.into(),
        }
    }

    fn not_found(key: &ItemKey) -> Error {
        Error::NotFound(format!("item {}", key))
    }

    /// Create an item owned by the acting user. The key is assigned
    /// here: the server's configured space plus a fresh opaque token.
    pub fn create(&self, acting: &UserKey, draft: ItemDraft) -> Result<Item> {
        if draft.item_type.is_empty() {
            return Err(Error::Validation("item type must not be empty".into()));
        }
        if draft.name.is_empty() {
            return Err(Error::Validation("item name must not be empty".into()));
        }

        let item = Item {
            key: ItemKey::new(self.space.clone(), Uuid::new_v4().to_string()),
            item_type: draft.item_type,
            name: draft.name,
            active: draft.active,
            location: draft.location,
            attributes: draft.attributes,
            created: Utc::now(),
            created_by: acting.clone(),
            children: vec![],
        };
        self.store.save(&item)?;
        tracing::info!(key = %item.key, item_type = %item.item_type, "item created");
        Ok(item)
    }

    /// Apply a partial update. Fields absent from the patch are left
    /// untouched; key, created, and created_by are never written. The
    /// store merges fetch and save in one transaction, so concurrent
    /// patches compose instead of overwriting each other.
    pub fn update(&self, key: &ItemKey, patch: ItemPatch) -> Result<Item> {
        let item = self.store.merge(key, patch)?;
        tracing::debug!(key = %item.key, "item updated");
        Ok(item)
    }

    pub fn get(&self, key: &ItemKey) -> Result<Item> {
        self.store
            .find_by_key(key)?
            .ok_or_else(|| Self::not_found(key))
    }

    /// Items created by the given user. Full scan plus filter — the
    /// accepted cost of keeping the creator out of the primary key.
    pub fn list_all(&self, creator: &UserKey) -> Result<Vec<Item>> {
        let all = self.store.find_all()?;
        Ok(all
            .into_iter()
            .filter(|item| item.created_by == *creator)
            .collect())
    }

    /// Add a directed parent→child edge. Both endpoints must already be
    /// stored (checked in the same transaction as the insert); a
    /// self-loop is rejected outright.
    pub fn add_child(&self, parent: &ItemKey, child: &ItemKey) -> Result<()> {
        if parent == child {
            return Err(Error::Validation(format!(
                "item {} cannot be its own child",
                parent
            )));
        }
        self.store.add_edge(parent, child)?;
        tracing::debug!(parent = %parent, child = %child, "edge added");
        Ok(())
    }

    /// All items the parent points to. Edges to purged items are
    /// skipped silently.
    pub fn list_children(&self, parent: &ItemKey) -> Result<Vec<Item>> {
        if self.store.find_by_key(parent)?.is_none() {
            return Err(Self::not_found(parent));
        }
        Ok(self.store.children_of(parent)?)
    }

    /// All items pointing to the given child, via the reverse index.
    /// Present (possibly empty) whenever the item itself exists.
    pub fn list_parents(&self, child: &ItemKey) -> Result<Option<Vec<Item>>> {
        if self.store.find_by_key(child)?.is_none() {
            return Err(Self::not_found(child));
        }
        Ok(Some(self.store.parents_of(child)?))
    }

    /// Administrative purge of every item and edge in the store.
    pub fn delete_all(&self, users: &UserService, admin: &UserKey) -> Result<()> {
        users.require_role(admin, Role::Admin)?;
        self.store.delete_all()?;
        tracing::warn!(admin = %admin, "all items purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Location;
    use crate::sqlite_store::SqliteStore;
    use crate::users::UserDraft;
    use crate::value::Value;

    fn setup() -> (ItemService, UserService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let items = ItemService::new(store.clone(), "t1");
        let users = UserService::new(store.clone(), "t1");
        (items, users, store)
    }

    fn owner() -> UserKey {
        UserKey::new("t1", "owner@example.com")
    }

    fn draft(item_type: &str, name: &str) -> ItemDraft {
        ItemDraft {
            item_type: item_type.into(),
            name: name.into(),
            active: true,
            ..Default::default()
        }
    }

    #[test]
    fn create_assigns_key_and_stamps_creator() {
        let (items, _, _) = setup();
        let created = items.create(&owner(), draft("room", "Lab")).unwrap();

        assert_eq!(created.key.space, "t1");
        assert!(!created.key.id.is_empty());
        assert_eq!(created.created_by, owner());

        let got = items.get(&created.key).unwrap();
        assert_eq!(got.key, created.key);
        assert_eq!(got.created_by, owner());
        assert_eq!(got.created.timestamp_millis(), created.created.timestamp_millis());
    }

    #[test]
    fn create_rejects_blank_fields() {
        let (items, _, _) = setup();
        let err = items.create(&owner(), draft("", "Lab")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = items.create(&owner(), draft("room", "")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn update_merges_present_fields_only() {
        let (items, _, _) = setup();
        let mut d = draft("room", "Lab");
        d.attributes.insert("floor".into(), Value::Int(2));
        let created = items.create(&owner(), d).unwrap();

        let patch = ItemPatch {
            name: Some("Lab B".into()),
            location: Some(Location { lat: 1.0, lng: 2.0 }),
            ..Default::default()
        };
        let updated = items.update(&created.key, patch).unwrap();

        assert_eq!(updated.name, "Lab B");
        assert_eq!(updated.location, Some(Location { lat: 1.0, lng: 2.0 }));
        // Untouched fields survive
        assert_eq!(updated.item_type, "room");
        assert_eq!(updated.attributes.get("floor"), Some(&Value::Int(2)));
        assert_eq!(updated.key, created.key);
        assert_eq!(updated.created_by, created.created_by);
    }

    #[test]
    fn empty_patch_is_a_successful_noop() {
        let (items, _, _) = setup();
        let created = items.create(&owner(), draft("room", "Lab")).unwrap();
        let result = items.update(&created.key, ItemPatch::default()).unwrap();
        assert_eq!(result, items.get(&created.key).unwrap());
    }

    #[test]
    fn concurrent_partial_updates_both_land() {
        let (items, _, _) = setup();
        let created = items.create(&owner(), draft("room", "Lab")).unwrap();
        let key = created.key.clone();

        let rename = {
            let items = items.clone();
            let key = key.clone();
            std::thread::spawn(move || {
                items
                    .update(
                        &key,
                        ItemPatch {
                            name: Some("Renamed".into()),
                            ..Default::default()
                        },
                    )
                    .unwrap();
            })
        };
        let deactivate = {
            let items = items.clone();
            let key = key.clone();
            std::thread::spawn(move || {
                items
                    .update(
                        &key,
                        ItemPatch {
                            active: Some(false),
                            ..Default::default()
                        },
                    )
                    .unwrap();
            })
        };
        rename.join().unwrap();
        deactivate.join().unwrap();

        // Neither single-field patch may clobber the other.
        let got = items.get(&key).unwrap();
        assert_eq!(got.name, "Renamed");
        assert!(!got.active);
    }

    #[test]
    fn update_missing_item_fails_not_found() {
        let (items, _, _) = setup();
        let err = items
            .update(&ItemKey::new("t1", "nope"), ItemPatch::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn list_all_filters_by_creator() {
        let (items, _, _) = setup();
        let alice = UserKey::new("t1", "alice@example.com");
        let bob = UserKey::new("t1", "bob@example.com");
        items.create(&alice, draft("room", "A1")).unwrap();
        items.create(&bob, draft("room", "B1")).unwrap();
        items.create(&alice, draft("room", "A2")).unwrap();

        let mine = items.list_all(&alice).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|i| i.created_by == alice));
    }

    #[test]
    fn add_child_requires_both_endpoints() {
        let (items, _, _) = setup();
        let parent = items.create(&owner(), draft("room", "Lab")).unwrap();
        let ghost = ItemKey::new("t1", "ghost");

        let err = items.add_child(&parent.key, &ghost).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = items.add_child(&ghost, &parent.key).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn add_child_rejects_self_loop() {
        let (items, _, _) = setup();
        let item = items.create(&owner(), draft("room", "Lab")).unwrap();
        let err = items.add_child(&item.key, &item.key).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn add_child_is_idempotent() {
        let (items, _, _) = setup();
        let parent = items.create(&owner(), draft("room", "Lab")).unwrap();
        let child = items.create(&owner(), draft("sensor", "Temp")).unwrap();

        items.add_child(&parent.key, &child.key).unwrap();
        items.add_child(&parent.key, &child.key).unwrap();

        let children = items.list_children(&parent.key).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].key, child.key);
    }

    #[test]
    fn longer_cycles_are_allowed() {
        let (items, _, _) = setup();
        let a = items.create(&owner(), draft("room", "A")).unwrap();
        let b = items.create(&owner(), draft("room", "B")).unwrap();
        items.add_child(&a.key, &b.key).unwrap();
        items.add_child(&b.key, &a.key).unwrap();

        assert_eq!(items.list_children(&a.key).unwrap()[0].key, b.key);
        assert_eq!(items.list_children(&b.key).unwrap()[0].key, a.key);
    }

    #[test]
    fn parents_reflect_the_reverse_index() {
        let (items, _, _) = setup();
        let a = items.create(&owner(), draft("room", "A")).unwrap();
        let b = items.create(&owner(), draft("sensor", "B")).unwrap();
        items.add_child(&a.key, &b.key).unwrap();

        let children = items.list_children(&a.key).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].key, b.key);

        let parents = items.list_parents(&b.key).unwrap().unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].key, a.key);

        // A root item has a present-but-empty parent list.
        let roots = items.list_parents(&a.key).unwrap().unwrap();
        assert!(roots.is_empty());
    }

    #[test]
    fn graph_queries_on_missing_items_fail_not_found() {
        let (items, _, _) = setup();
        let ghost = ItemKey::new("t1", "ghost");
        assert!(matches!(items.get(&ghost).unwrap_err(), Error::NotFound(_)));
        assert!(matches!(
            items.list_children(&ghost).unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            items.list_parents(&ghost).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn delete_all_is_admin_gated() {
        let (items, users, _) = setup();
        users
            .register(UserDraft {
                email: "admin@example.com".into(),
                username: "admin".into(),
                avatar: "A".into(),
                role: Role::Admin,
            })
            .unwrap();
        users
            .register(UserDraft {
                email: "player@example.com".into(),
                username: "player".into(),
                avatar: "P".into(),
                role: Role::Player,
            })
            .unwrap();

        items.create(&owner(), draft("room", "Lab")).unwrap();

        let err = items
            .delete_all(&users, &UserKey::new("t1", "player@example.com"))
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));

        items
            .delete_all(&users, &UserKey::new("t1", "admin@example.com"))
            .unwrap();
        assert!(items.list_all(&owner()).unwrap().is_empty());
    }
}
