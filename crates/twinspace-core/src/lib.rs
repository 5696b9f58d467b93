pub mod config;
pub mod dispatch;
pub mod error;
pub mod item;
pub mod items;
pub mod key;
pub mod operation;
pub mod sqlite_store;
pub mod store;
pub mod user;
pub mod users;
pub mod value;

pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use item::*;
pub use items::*;
pub use key::*;
pub use operation::*;
pub use sqlite_store::SqliteStore;
pub use store::*;
pub use user::*;
pub use users::*;
pub use value::*;
