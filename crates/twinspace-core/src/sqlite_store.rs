use std::path::Path;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::item::{Item, ItemPatch, Location};
use crate::key::{ItemKey, OperationId, UserKey};
use crate::operation::OperationRecord;
use crate::store::{ItemStore, OperationStore, StoreError, UserStore};
use crate::user::{Role, User};
use crate::value::Attributes;

/// SQLite-backed implementation of all three store traits.
///
/// A single connection behind a mutex serializes writers; multi-step
/// mutations run inside one transaction so a failure never leaves a
/// partially committed record or edge behind.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StoreError::Storage(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS items (
                space TEXT NOT NULL,
                id TEXT NOT NULL,
                item_type TEXT NOT NULL,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                loc_lat REAL,
                loc_lng REAL,
                attributes TEXT NOT NULL,
                created INTEGER NOT NULL,
                created_by_space TEXT NOT NULL,
                created_by_email TEXT NOT NULL,
                PRIMARY KEY (space, id)
            );

            CREATE TABLE IF NOT EXISTS item_children (
                parent_space TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                child_space TEXT NOT NULL,
                child_id TEXT NOT NULL,
                PRIMARY KEY (parent_space, parent_id, child_space, child_id)
            );

            CREATE TABLE IF NOT EXISTS users (
                space TEXT NOT NULL,
                email TEXT NOT NULL,
                username TEXT NOT NULL,
                avatar TEXT NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (space, email)
            );

            CREATE TABLE IF NOT EXISTS operations (
                space TEXT NOT NULL,
                id TEXT NOT NULL,
                op_type TEXT NOT NULL,
                target_space TEXT NOT NULL,
                target_id TEXT NOT NULL,
                invoked_by_space TEXT NOT NULL,
                invoked_by_email TEXT NOT NULL,
                attributes TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (space, id)
            );

            CREATE INDEX IF NOT EXISTS idx_items_creator
                ON items(created_by_space, created_by_email);
            CREATE INDEX IF NOT EXISTS idx_children_reverse
                ON item_children(child_space, child_id);
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
            CREATE INDEX IF NOT EXISTS idx_operations_ts ON operations(timestamp);
            ",
        )
        .map_err(|e| StoreError::Storage(format!("init_schema: {}", e)))?;
        Ok(())
    }

    fn row_to_item(conn: &Connection, row: &rusqlite::Row<'_>) -> Result<Item, StoreError> {
        let space: String = row
            .get(0)
            .map_err(|e| StoreError::Storage(format!("row space: {}", e)))?;
        let id: String = row
            .get(1)
            .map_err(|e| StoreError::Storage(format!("row id: {}", e)))?;
        let item_type: String = row
            .get(2)
            .map_err(|e| StoreError::Storage(format!("row item_type: {}", e)))?;
        let name: String = row
            .get(3)
            .map_err(|e| StoreError::Storage(format!("row name: {}", e)))?;
        let active: bool = row
            .get(4)
            .map_err(|e| StoreError::Storage(format!("row active: {}", e)))?;
        let loc_lat: Option<f64> = row
            .get(5)
            .map_err(|e| StoreError::Storage(format!("row loc_lat: {}", e)))?;
        let loc_lng: Option<f64> = row
            .get(6)
            .map_err(|e| StoreError::Storage(format!("row loc_lng: {}", e)))?;
        let attributes_json: String = row
            .get(7)
            .map_err(|e| StoreError::Storage(format!("row attributes: {}", e)))?;
        let created_ms: i64 = row
            .get(8)
            .map_err(|e| StoreError::Storage(format!("row created: {}", e)))?;
        let created_by_space: String = row
            .get(9)
            .map_err(|e| StoreError::Storage(format!("row created_by_space: {}", e)))?;
        let created_by_email: String = row
            .get(10)
            .map_err(|e| StoreError::Storage(format!("row created_by_email: {}", e)))?;

        let attributes: Attributes = serde_json::from_str(&attributes_json)
            .map_err(|e| StoreError::Storage(format!("parse attributes: {}", e)))?;
        let created = Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .unwrap_or_else(Utc::now);
        let location = match (loc_lat, loc_lng) {
            (Some(lat), Some(lng)) => Some(Location { lat, lng }),
            _ => None,
        };

        let key = ItemKey::new(space, id);
        let children = Self::load_child_keys(conn, &key)?;

        Ok(Item {
            key,
            item_type,
            name,
            active,
            location,
            attributes,
            created,
            created_by: UserKey::new(created_by_space, created_by_email),
            children,
        })
    }

    /// Keys of surviving children. Edges to purged items are invisible,
    /// never an error.
    fn load_child_keys(conn: &Connection, parent: &ItemKey) -> Result<Vec<ItemKey>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT c.child_space, c.child_id
                 FROM item_children c
                 JOIN items i ON i.space = c.child_space AND i.id = c.child_id
                 WHERE c.parent_space = ?1 AND c.parent_id = ?2
                 ORDER BY i.rowid",
            )
            .map_err(|e| StoreError::Storage(format!("prepare child keys: {}", e)))?;
        let keys = stmt
            .query_map(params![parent.space, parent.id], |row| {
                Ok(ItemKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::Storage(format!("query child keys: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Storage(format!("collect child keys: {}", e)))?;
        Ok(keys)
    }

    fn query_items(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Item>, StoreError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StoreError::Storage(format!("prepare items: {}", e)))?;
        let rows = stmt
            .query_map(args, |row| Ok(Self::row_to_item(conn, row)))
            .map_err(|e| StoreError::Storage(format!("query items: {}", e)))?;

        let mut items = Vec::new();
        for row_result in rows {
            let item = row_result.map_err(|e| StoreError::Storage(format!("row: {}", e)))?;
            items.push(item?);
        }
        Ok(items)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> Result<User, StoreError> {
        let space: String = row
            .get(0)
            .map_err(|e| StoreError::Storage(format!("row space: {}", e)))?;
        let email: String = row
            .get(1)
            .map_err(|e| StoreError::Storage(format!("row email: {}", e)))?;
        let username: String = row
            .get(2)
            .map_err(|e| StoreError::Storage(format!("row username: {}", e)))?;
        let avatar: String = row
            .get(3)
            .map_err(|e| StoreError::Storage(format!("row avatar: {}", e)))?;
        let role_str: String = row
            .get(4)
            .map_err(|e| StoreError::Storage(format!("row role: {}", e)))?;
        let role = role_str
            .parse::<Role>()
            .map_err(|_| StoreError::Storage(format!("unknown stored role: {}", role_str)))?;
        Ok(User {
            key: UserKey::new(space, email),
            username,
            avatar,
            role,
        })
    }

    fn row_to_operation(row: &rusqlite::Row<'_>) -> Result<OperationRecord, StoreError> {
        let space: String = row
            .get(0)
            .map_err(|e| StoreError::Storage(format!("row space: {}", e)))?;
        let id: String = row
            .get(1)
            .map_err(|e| StoreError::Storage(format!("row id: {}", e)))?;
        let op_type: String = row
            .get(2)
            .map_err(|e| StoreError::Storage(format!("row op_type: {}", e)))?;
        let target_space: String = row
            .get(3)
            .map_err(|e| StoreError::Storage(format!("row target_space: {}", e)))?;
        let target_id: String = row
            .get(4)
            .map_err(|e| StoreError::Storage(format!("row target_id: {}", e)))?;
        let invoked_by_space: String = row
            .get(5)
            .map_err(|e| StoreError::Storage(format!("row invoked_by_space: {}", e)))?;
        let invoked_by_email: String = row
            .get(6)
            .map_err(|e| StoreError::Storage(format!("row invoked_by_email: {}", e)))?;
        let attributes_json: String = row
            .get(7)
            .map_err(|e| StoreError::Storage(format!("row attributes: {}", e)))?;
        let timestamp_ms: i64 = row
            .get(8)
            .map_err(|e| StoreError::Storage(format!("row timestamp: {}", e)))?;

        let attributes: Attributes = serde_json::from_str(&attributes_json)
            .map_err(|e| StoreError::Storage(format!("parse attributes: {}", e)))?;
        let timestamp = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(OperationRecord {
            id: OperationId::new(space, id),
            op_type,
            target: ItemKey::new(target_space, target_id),
            invoked_by: UserKey::new(invoked_by_space, invoked_by_email),
            attributes,
            timestamp,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))
    }
}

const ITEM_COLUMNS: &str = "space, id, item_type, name, active, loc_lat, loc_lng,
                            attributes, created, created_by_space, created_by_email";

impl ItemStore for SqliteStore {
    fn find_by_key(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM items WHERE space = ?1 AND id = ?2",
                ITEM_COLUMNS
            ))
            .map_err(|e| StoreError::Storage(format!("prepare get: {}", e)))?;

        let item = stmt
            .query_row(params![key.space, key.id], |row| {
                Ok(Self::row_to_item(&conn, row))
            })
            .optional()
            .map_err(|e| StoreError::Storage(format!("query get: {}", e)))?;

        match item {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn save(&self, item: &Item) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let attributes_json = serde_json::to_string(&item.attributes)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let (loc_lat, loc_lng) = match item.location {
            Some(loc) => (Some(loc.lat), Some(loc.lng)),
            None => (None, None),
        };
        conn.execute(
            "INSERT INTO items (space, id, item_type, name, active, loc_lat, loc_lng,
                                attributes, created, created_by_space, created_by_email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (space, id) DO UPDATE SET
                item_type = excluded.item_type,
                name = excluded.name,
                active = excluded.active,
                loc_lat = excluded.loc_lat,
                loc_lng = excluded.loc_lng,
                attributes = excluded.attributes",
            params![
                item.key.space,
                item.key.id,
                item.item_type,
                item.name,
                item.active as i32,
                loc_lat,
                loc_lng,
                attributes_json,
                item.created.timestamp_millis(),
                item.created_by.space,
                item.created_by.email,
            ],
        )
        .map_err(|e| StoreError::Storage(format!("save item: {}", e)))?;
        Ok(())
    }

    fn find_all(&self) -> Result<Vec<Item>, StoreError> {
        let conn = self.lock()?;
        Self::query_items(
            &conn,
            &format!("SELECT {} FROM items ORDER BY rowid", ITEM_COLUMNS),
            &[],
        )
    }

    fn merge(&self, key: &ItemKey, patch: ItemPatch) -> Result<Item, StoreError> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Storage(format!("begin tx: {}", e)))?;

        let found = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {} FROM items WHERE space = ?1 AND id = ?2",
                    ITEM_COLUMNS
                ))
                .map_err(|e| StoreError::Storage(format!("prepare merge: {}", e)))?;
            stmt.query_row(params![key.space, key.id], |row| {
                Ok(Self::row_to_item(&tx, row))
            })
            .optional()
            .map_err(|e| StoreError::Storage(format!("query merge: {}", e)))?
        };
        let mut item = match found {
            Some(Ok(item)) => item,
            Some(Err(e)) => return Err(e),
            None => return Err(StoreError::NotFound(format!("item {}", key))),
        };

        if patch.apply(&mut item) {
            let attributes_json = serde_json::to_string(&item.attributes)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let (loc_lat, loc_lng) = match item.location {
                Some(loc) => (Some(loc.lat), Some(loc.lng)),
                None => (None, None),
            };
            tx.execute(
                "UPDATE items SET item_type = ?3, name = ?4, active = ?5,
                                  loc_lat = ?6, loc_lng = ?7, attributes = ?8
                 WHERE space = ?1 AND id = ?2",
                params![
                    item.key.space,
                    item.key.id,
                    item.item_type,
                    item.name,
                    item.active as i32,
                    loc_lat,
                    loc_lng,
                    attributes_json,
                ],
            )
            .map_err(|e| StoreError::Storage(format!("merge item: {}", e)))?;
        }
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("commit: {}", e)))?;
        Ok(item)
    }

    fn add_edge(&self, parent: &ItemKey, child: &ItemKey) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Storage(format!("begin tx: {}", e)))?;
        for key in [parent, child] {
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM items WHERE space = ?1 AND id = ?2)",
                    params![key.space, key.id],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Storage(format!("check endpoint: {}", e)))?;
            if !exists {
                return Err(StoreError::NotFound(format!("item {}", key)));
            }
        }
        tx.execute(
            "INSERT OR IGNORE INTO item_children
                (parent_space, parent_id, child_space, child_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![parent.space, parent.id, child.space, child.id],
        )
        .map_err(|e| StoreError::Storage(format!("add edge: {}", e)))?;
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("commit: {}", e)))?;
        Ok(())
    }

    fn children_of(&self, parent: &ItemKey) -> Result<Vec<Item>, StoreError> {
        let conn = self.lock()?;
        Self::query_items(
            &conn,
            &format!(
                "SELECT {} FROM items i
                 JOIN item_children c ON i.space = c.child_space AND i.id = c.child_id
                 WHERE c.parent_space = ?1 AND c.parent_id = ?2
                 ORDER BY i.rowid",
                ITEM_COLUMNS
            ),
            &[&parent.space, &parent.id],
        )
    }

    fn parents_of(&self, child: &ItemKey) -> Result<Vec<Item>, StoreError> {
        let conn = self.lock()?;
        Self::query_items(
            &conn,
            &format!(
                "SELECT {} FROM items i
                 JOIN item_children c ON i.space = c.parent_space AND i.id = c.parent_id
                 WHERE c.child_space = ?1 AND c.child_id = ?2
                 ORDER BY i.rowid",
                ITEM_COLUMNS
            ),
            &[&child.space, &child.id],
        )
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Storage(format!("begin tx: {}", e)))?;
        tx.execute("DELETE FROM item_children", [])
            .map_err(|e| StoreError::Storage(format!("delete edges: {}", e)))?;
        tx.execute("DELETE FROM items", [])
            .map_err(|e| StoreError::Storage(format!("delete items: {}", e)))?;
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("commit: {}", e)))?;
        Ok(())
    }
}

impl UserStore for SqliteStore {
    fn find_by_key(&self, key: &UserKey) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT space, email, username, avatar, role
                 FROM users WHERE space = ?1 AND email = ?2",
            )
            .map_err(|e| StoreError::Storage(format!("prepare get user: {}", e)))?;

        let user = stmt
            .query_row(params![key.space, key.email], |row| Ok(Self::row_to_user(row)))
            .optional()
            .map_err(|e| StoreError::Storage(format!("query get user: {}", e)))?;

        match user {
            Some(Ok(user)) => Ok(Some(user)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn save(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (space, email, username, avatar, role)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (space, email) DO UPDATE SET
                username = excluded.username,
                avatar = excluded.avatar,
                role = excluded.role",
            params![
                user.key.space,
                user.key.email,
                user.username,
                user.avatar,
                user.role.to_string(),
            ],
        )
        .map_err(|e| StoreError::Storage(format!("save user: {}", e)))?;
        Ok(())
    }

    fn page(&self, size: usize, page: usize) -> Result<Vec<User>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT space, email, username, avatar, role FROM users
                 ORDER BY username DESC, space DESC, email DESC
                 LIMIT ?1 OFFSET ?2",
            )
            .map_err(|e| StoreError::Storage(format!("prepare page users: {}", e)))?;
        let rows = stmt
            .query_map(params![size as i64, (size * page) as i64], |row| {
                Ok(Self::row_to_user(row))
            })
            .map_err(|e| StoreError::Storage(format!("query page users: {}", e)))?;

        let mut users = Vec::new();
        for row_result in rows {
            let user = row_result.map_err(|e| StoreError::Storage(format!("row: {}", e)))?;
            users.push(user?);
        }
        Ok(users)
    }

    fn page_by_role(&self, role: Role, size: usize, page: usize) -> Result<Vec<User>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT space, email, username, avatar, role FROM users
                 WHERE role = ?1
                 ORDER BY username DESC, space DESC, email DESC
                 LIMIT ?2 OFFSET ?3",
            )
            .map_err(|e| StoreError::Storage(format!("prepare page by role: {}", e)))?;
        let rows = stmt
            .query_map(
                params![role.to_string(), size as i64, (size * page) as i64],
                |row| Ok(Self::row_to_user(row)),
            )
            .map_err(|e| StoreError::Storage(format!("query page by role: {}", e)))?;

        let mut users = Vec::new();
        for row_result in rows {
            let user = row_result.map_err(|e| StoreError::Storage(format!("row: {}", e)))?;
            users.push(user?);
        }
        Ok(users)
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM users", [])
            .map_err(|e| StoreError::Storage(format!("delete users: {}", e)))?;
        Ok(())
    }
}

impl OperationStore for SqliteStore {
    fn save(&self, record: &OperationRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let attributes_json = serde_json::to_string(&record.attributes)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute(
            "INSERT INTO operations (space, id, op_type, target_space, target_id,
                                     invoked_by_space, invoked_by_email, attributes, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.space,
                record.id.id,
                record.op_type,
                record.target.space,
                record.target.id,
                record.invoked_by.space,
                record.invoked_by.email,
                attributes_json,
                record.timestamp.timestamp_millis(),
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    return StoreError::AlreadyExists(record.id.to_string());
                }
            }
            StoreError::Storage(format!("save operation: {}", e))
        })?;
        Ok(())
    }

    fn page(&self, size: usize, page: usize) -> Result<Vec<OperationRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT space, id, op_type, target_space, target_id,
                        invoked_by_space, invoked_by_email, attributes, timestamp
                 FROM operations
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2",
            )
            .map_err(|e| StoreError::Storage(format!("prepare page operations: {}", e)))?;
        let rows = stmt
            .query_map(params![size as i64, (size * page) as i64], |row| {
                Ok(Self::row_to_operation(row))
            })
            .map_err(|e| StoreError::Storage(format!("query page operations: {}", e)))?;

        let mut records = Vec::new();
        for row_result in rows {
            let record = row_result.map_err(|e| StoreError::Storage(format!("row: {}", e)))?;
            records.push(record?);
        }
        Ok(records)
    }

    fn delete(&self, id: &OperationId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM operations WHERE space = ?1 AND id = ?2",
            params![id.space, id.id],
        )
        .map_err(|e| StoreError::Storage(format!("delete operation: {}", e)))?;
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM operations", [])
            .map_err(|e| StoreError::Storage(format!("delete operations: {}", e)))?;
        Ok(())
    }
}
