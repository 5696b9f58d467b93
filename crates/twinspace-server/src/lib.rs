//! Twinspace Server
//!
//! HTTP boundary for the item/operation/user API.

pub mod http;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use twinspace_core::{
    EchoHandler, HandlerRegistry, ItemService, OperationService, PingHandler, SqliteStore,
    TwinspaceConfig, UserService,
};

/// Shared application state
pub struct AppState {
    pub items: ItemService,
    pub users: UserService,
    pub operations: OperationService,
    pub default_page_size: usize,
}

impl AppState {
    /// Open the configured database and wire up the services.
    pub fn new(config: &TwinspaceConfig) -> Result<Self, twinspace_core::Error> {
        let store = Arc::new(SqliteStore::open(&config.storage.path)?);
        Ok(Self::with_store(store, config))
    }

    /// Wire up the services over an already opened store.
    pub fn with_store(store: Arc<SqliteStore>, config: &TwinspaceConfig) -> Self {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(EchoHandler));
        registry.register("ping", Arc::new(PingHandler));

        Self {
            items: ItemService::new(store.clone(), config.space.clone()),
            users: UserService::new(store.clone(), config.space.clone()),
            operations: OperationService::new(
                registry,
                store.clone(),
                store,
                config.space.clone(),
                config.dispatch.queue_capacity,
                config.dispatch.workers,
            ),
            default_page_size: config.paging.default_size,
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Item endpoints
        .route("/items", post(http::create_item))
        .route("/items", get(http::list_items))
        .route("/items/{space}/{id}", put(http::update_item))
        .route("/items/{space}/{id}", get(http::get_item))
        .route("/items/{space}/{id}/children", put(http::add_child))
        .route("/items/{space}/{id}/children", get(http::list_children))
        .route("/items/{space}/{id}/parents", get(http::list_parents))
        // Operation endpoints
        .route("/operations", post(http::invoke_operation))
        .route("/operations/async", post(http::invoke_operation_async))
        // User endpoints
        .route("/users", post(http::register_user))
        .route("/users/login/{space}/{email}", get(http::login))
        .route("/users/{space}/{email}", put(http::update_user))
        .route("/users/role/{role}", get(http::list_users_by_role))
        // Admin endpoints
        .route("/admin/users/{space}/{email}", get(http::list_users))
        .route("/admin/users/{space}/{email}", delete(http::purge_users))
        .route("/admin/items/{space}/{email}", delete(http::purge_items))
        .route(
            "/admin/operations/{space}/{email}",
            get(http::list_operations),
        )
        .route(
            "/admin/operations/{space}/{email}",
            delete(http::purge_operations),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Twinspace server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
