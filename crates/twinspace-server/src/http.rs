//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use twinspace_core::{
    Error, Item, ItemDraft, ItemKey, ItemPatch, OperationDraft, OperationRecord, Role, User,
    UserDraft, UserKey, UserUpdate, Value,
};

use crate::AppState;

/// Map a service error onto the HTTP status space.
fn reject(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AccessDenied(_) => StatusCode::FORBIDDEN,
        Error::AlreadyExists(_) => StatusCode::CONFLICT,
        Error::Validation(_) | Error::UnsupportedOperation(_) => StatusCode::BAD_REQUEST,
        Error::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Request to create an item
#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub created_by: UserKey,
    #[serde(flatten)]
    pub draft: ItemDraft,
}

/// Query selecting a creator by key
#[derive(Debug, Deserialize)]
pub struct CreatorQuery {
    pub space: String,
    pub email: String,
}

/// Paging parameters with server-side defaults
#[derive(Debug, Default, Deserialize)]
pub struct PagingQuery {
    pub size: Option<usize>,
    pub page: Option<usize>,
}

impl PagingQuery {
    fn resolve(&self, default_size: usize) -> (usize, usize) {
        (self.size.unwrap_or(default_size), self.page.unwrap_or(0))
    }
}

/// Create an item on behalf of the acting user
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateItemRequest>,
) -> Result<Json<Item>, (StatusCode, String)> {
    state
        .items
        .create(&request.created_by, request.draft)
        .map(Json)
        .map_err(reject)
}

/// Apply a partial update to an item
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((space, id)): Path<(String, String)>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<Item>, (StatusCode, String)> {
    state
        .items
        .update(&ItemKey::new(space, id), patch)
        .map(Json)
        .map_err(reject)
}

/// Get a single item
pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path((space, id)): Path<(String, String)>,
) -> Result<Json<Item>, (StatusCode, String)> {
    state
        .items
        .get(&ItemKey::new(space, id))
        .map(Json)
        .map_err(reject)
}

/// List the items created by one user
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CreatorQuery>,
) -> Result<Json<Vec<Item>>, (StatusCode, String)> {
    state
        .items
        .list_all(&UserKey::new(query.space, query.email))
        .map(Json)
        .map_err(reject)
}

/// Attach a child to a parent item
pub async fn add_child(
    State(state): State<Arc<AppState>>,
    Path((space, id)): Path<(String, String)>,
    Json(child): Json<ItemKey>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .items
        .add_child(&ItemKey::new(space, id), &child)
        .map_err(reject)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// List an item's children
pub async fn list_children(
    State(state): State<Arc<AppState>>,
    Path((space, id)): Path<(String, String)>,
) -> Result<Json<Vec<Item>>, (StatusCode, String)> {
    state
        .items
        .list_children(&ItemKey::new(space, id))
        .map(Json)
        .map_err(reject)
}

/// List the items holding an edge to this one
pub async fn list_parents(
    State(state): State<Arc<AppState>>,
    Path((space, id)): Path<(String, String)>,
) -> Result<Json<Option<Vec<Item>>>, (StatusCode, String)> {
    state
        .items
        .list_parents(&ItemKey::new(space, id))
        .map(Json)
        .map_err(reject)
}

/// Run an operation synchronously and return the handler's result
pub async fn invoke_operation(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<OperationDraft>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.operations.invoke(draft).map(Json).map_err(reject)
}

/// Enqueue an operation and return the stored record as acknowledgement
pub async fn invoke_operation_async(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<OperationDraft>,
) -> Result<Json<OperationRecord>, (StatusCode, String)> {
    state
        .operations
        .invoke_async(draft)
        .map(Json)
        .map_err(reject)
}

/// Register a new user account
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<UserDraft>,
) -> Result<Json<User>, (StatusCode, String)> {
    state.users.register(draft).map(Json).map_err(reject)
}

/// Fetch the account for a login attempt
pub async fn login(
    State(state): State<Arc<AppState>>,
    Path((space, email)): Path<(String, String)>,
) -> Result<Json<User>, (StatusCode, String)> {
    state
        .users
        .login(&UserKey::new(space, email))
        .map(Json)
        .map_err(reject)
}

/// Overwrite a user's mutable fields
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path((space, email)): Path<(String, String)>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, (StatusCode, String)> {
    state
        .users
        .update(&UserKey::new(space, email), update)
        .map(Json)
        .map_err(reject)
}

/// One page of users in a given role (no gate)
pub async fn list_users_by_role(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Query(paging): Query<PagingQuery>,
) -> Result<Json<Vec<User>>, (StatusCode, String)> {
    let role: Role = role.parse().map_err(reject)?;
    let (size, page) = paging.resolve(state.default_page_size);
    state
        .users
        .list_by_role(role, size, page)
        .map(Json)
        .map_err(reject)
}

/// One page of all users; the acting user must be an admin
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Path((space, email)): Path<(String, String)>,
    Query(paging): Query<PagingQuery>,
) -> Result<Json<Vec<User>>, (StatusCode, String)> {
    let (size, page) = paging.resolve(state.default_page_size);
    state
        .users
        .list_users(&UserKey::new(space, email), size, page)
        .map(Json)
        .map_err(reject)
}

/// One page of the operation log; admin only
pub async fn list_operations(
    State(state): State<Arc<AppState>>,
    Path((space, email)): Path<(String, String)>,
    Query(paging): Query<PagingQuery>,
) -> Result<Json<Vec<OperationRecord>>, (StatusCode, String)> {
    let (size, page) = paging.resolve(state.default_page_size);
    state
        .operations
        .list_all(&state.users, &UserKey::new(space, email), size, page)
        .map(Json)
        .map_err(reject)
}

/// Purge all users; admin only
pub async fn purge_users(
    State(state): State<Arc<AppState>>,
    Path((space, email)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .users
        .delete_all(&UserKey::new(space, email))
        .map_err(reject)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Purge all items and edges; admin only
pub async fn purge_items(
    State(state): State<Arc<AppState>>,
    Path((space, email)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .items
        .delete_all(&state.users, &UserKey::new(space, email))
        .map_err(reject)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Purge the operation log; admin only
pub async fn purge_operations(
    State(state): State<Arc<AppState>>,
    Path((space, email)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .operations
        .delete_all(&state.users, &UserKey::new(space, email))
        .map_err(reject)?;
    Ok(Json(serde_json::json!({ "success": true })))
}
