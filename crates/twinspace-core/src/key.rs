use serde::{Deserialize, Serialize};

/// Composite key of an item: tenant space plus server-assigned id token.
///
/// Keys are value types — two keys with the same space and id are the
/// same key wherever they appear (map keys, edge endpoints, wire form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub space: String,
    pub id: String,
}

impl ItemKey {
    pub fn new(space: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.space, self.id)
    }
}

/// Composite key of a user: tenant space plus email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserKey {
    pub space: String,
    pub email: String,
}

impl UserKey {
    pub fn new(space: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.space, self.email)
    }
}

/// Composite key of a recorded operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId {
    pub space: String,
    pub id: String,
}

impl OperationId {
    pub fn new(space: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.space, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn item_key_structural_equality() {
        let a = ItemKey::new("t1", "abc");
        let b = ItemKey::new("t1", "abc");
        let c = ItemKey::new("t2", "abc");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn user_key_display() {
        let k = UserKey::new("t1", "admin@example.com");
        assert_eq!(k.to_string(), "t1/admin@example.com");
    }

    #[test]
    fn key_serde_round_trip() {
        let k = ItemKey::new("t1", "abc-123");
        let json = serde_json::to_string(&k).unwrap();
        let back: ItemKey = serde_json::from_str(&json).unwrap();
        assert_eq!(k, back);
    }
}
