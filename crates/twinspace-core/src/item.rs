use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::{ItemKey, UserKey};
use crate::value::Attributes;

/// Geographic position of an item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// The core entity of the item graph.
///
/// `key`, `created`, and `created_by` are stamped at creation and never
/// change afterwards. `children` holds the outgoing parent→child edges;
/// incoming edges are queried through the store's reverse index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub item_type: String,
    pub name: String,
    pub active: bool,
    pub location: Option<Location>,
    pub attributes: Attributes,
    pub created: DateTime<Utc>,
    pub created_by: UserKey,
    pub children: Vec<ItemKey>,
}

/// Partial update applied to a stored item.
///
/// `None` means "leave the stored field untouched" — there is no way to
/// clear a field back to empty through a patch, matching the update
/// semantics this API has always had.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub item_type: Option<String>,
    pub name: Option<String>,
    pub active: Option<bool>,
    pub location: Option<Location>,
    pub attributes: Option<Attributes>,
}

impl ItemPatch {
    /// True when no field is present, i.e. applying the patch is a no-op.
    pub fn is_empty(&self) -> bool {
        self.item_type.is_none()
            && self.name.is_none()
            && self.active.is_none()
            && self.location.is_none()
            && self.attributes.is_none()
    }

    /// Merge the present fields into an item. Returns true when any
    /// field actually changed hands.
    pub fn apply(self, item: &mut Item) -> bool {
        let mut dirty = false;
        if let Some(item_type) = self.item_type {
            item.item_type = item_type;
            dirty = true;
        }
        if let Some(name) = self.name {
            item.name = name;
            dirty = true;
        }
        if let Some(active) = self.active {
            item.active = active;
            dirty = true;
        }
        if let Some(location) = self.location {
            item.location = Some(location);
            dirty = true;
        }
        if let Some(attributes) = self.attributes {
            item.attributes = attributes;
            dirty = true;
        }
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::collections::BTreeMap;

    #[test]
    fn item_serde_round_trip() {
        let mut attributes = BTreeMap::new();
        attributes.insert("floor".into(), Value::Int(3));
        attributes.insert("label".into(), Value::String("east wing".into()));

        let item = Item {
            key: ItemKey::new("t1", "room-1"),
            item_type: "room".into(),
            name: "Conference Room".into(),
            active: true,
            location: Some(Location {
                lat: 32.11,
                lng: 34.8,
            }),
            attributes,
            created: Utc::now(),
            created_by: UserKey::new("t1", "owner@example.com"),
            children: vec![ItemKey::new("t1", "sensor-1")],
        };
        let json = serde_json::to_string(&item).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(ItemPatch::default().is_empty());
        let patch = ItemPatch {
            name: Some("renamed".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn apply_merges_present_fields_only() {
        let mut item = Item {
            key: ItemKey::new("t1", "room-1"),
            item_type: "room".into(),
            name: "Lab".into(),
            active: true,
            location: None,
            attributes: BTreeMap::new(),
            created: Utc::now(),
            created_by: UserKey::new("t1", "owner@example.com"),
            children: vec![],
        };

        assert!(!ItemPatch::default().apply(&mut item));

        let patch = ItemPatch {
            name: Some("Lab B".into()),
            active: Some(false),
            ..Default::default()
        };
        assert!(patch.apply(&mut item));
        assert_eq!(item.name, "Lab B");
        assert!(!item.active);
        assert_eq!(item.item_type, "room");
    }

    #[test]
    fn patch_deserializes_missing_fields_as_absent() {
        let patch: ItemPatch = serde_json::from_str(r#"{"name": "only name"}"#).unwrap();
        assert_eq!(patch.name.as_deref(), Some("only name"));
        assert!(patch.item_type.is_none());
        assert!(patch.active.is_none());
        assert!(patch.location.is_none());
        assert!(patch.attributes.is_none());
    }
}
