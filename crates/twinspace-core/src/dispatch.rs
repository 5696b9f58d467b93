use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::item::Item;
use crate::key::{OperationId, UserKey};
use crate::operation::{OperationDraft, OperationRecord, OperationStatus};
use crate::store::{ItemStore, OperationStore};
use crate::user::Role;
use crate::users::UserService;
use crate::value::{Attributes, Value};

/// One operation type's executable behavior. Handlers are resolved by
/// type string at invocation time.
pub trait OperationHandler: Send + Sync {
    fn invoke(&self, target: &Item, attributes: &Attributes) -> Result<Value>;
}

/// Maps operation type strings to their handlers. Built once at
/// startup; an unregistered type is an unsupported operation.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, op_type: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        self.handlers.insert(op_type.into(), handler);
    }

    pub fn resolve(&self, op_type: &str) -> Result<Arc<dyn OperationHandler>> {
        self.handlers
            .get(op_type)
            .cloned()
            .ok_or_else(|| Error::UnsupportedOperation(op_type.to_string()))
    }
}

/// Returns the invocation attributes unchanged.
pub struct EchoHandler;

impl OperationHandler for EchoHandler {
    fn invoke(&self, _target: &Item, attributes: &Attributes) -> Result<Value> {
        Ok(Value::Object(attributes.clone()))
    }
}

/// Liveness probe: answers with the target key and the current time.
pub struct PingHandler;

impl OperationHandler for PingHandler {
    fn invoke(&self, target: &Item, _attributes: &Attributes) -> Result<Value> {
        let mut reply = Attributes::new();
        reply.insert("target".into(), Value::String(target.key.to_string()));
        reply.insert(
            "timestamp".into(),
            Value::Int(Utc::now().timestamp_millis()),
        );
        Ok(Value::Object(reply))
    }
}

/// A fully resolved invocation handed to a worker thread. Validation
/// and lookups happen before enqueue; workers only execute.
struct Job {
    record: OperationRecord,
    handler: Arc<dyn OperationHandler>,
    target: Item,
}

/// Operation intake and dispatch.
///
/// The synchronous path runs the handler inline and returns its result.
/// The asynchronous path acknowledges once the record is stored and the
/// job is enqueued; a bounded queue feeds a fixed set of worker
/// threads, and a full queue rejects the invocation instead of queueing
/// unboundedly. Workers exit when the service is dropped.
pub struct OperationService {
    registry: Arc<HandlerRegistry>,
    items: Arc<dyn ItemStore>,
    store: Arc<dyn OperationStore>,
    space: String,
    queue: SyncSender<Job>,
    // Shared with the workers; held here so the channel stays connected
    // even when the pool is empty.
    _queue_rx: Arc<Mutex<Receiver<Job>>>,
}

impl OperationService {
    pub fn new(
        registry: HandlerRegistry,
        items: Arc<dyn ItemStore>,
        store: Arc<dyn OperationStore>,
        space: impl Into<String>,
        queue_capacity: usize,
        workers: usize,
    ) -> Self {
        let (tx, rx) = mpsc::sync_channel::<Job>(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        for n in 0..workers {
            let worker_rx = Arc::clone(&rx);
            let spawned = thread::Builder::new()
                .name(format!("dispatch-{}", n))
                .spawn(move || loop {
                    let job = match worker_rx.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => break,
                    };
                    match job {
                        Ok(job) => run_job(job),
                        Err(_) => break,
                    }
                });
            if let Err(err) = spawned {
                tracing::error!(worker = n, error = %err, "failed to spawn dispatch worker");
            }
        }
        Self {
            registry: Arc::new(registry),
            items,
            store,
            space: space.into(),
            queue: tx,
            _queue_rx: rx,
        }
    }

    /// Validate a draft and resolve everything it references: the
    /// handler for its type and the target item.
    fn prepare(&self, draft: &OperationDraft) -> Result<(Arc<dyn OperationHandler>, Item)> {
        tracing::debug!(op_type = %draft.op_type, target = %draft.target,
            status = %OperationStatus::Received, "operation received");
        if draft.op_type.is_empty() {
            return Err(Error::Validation("operation type must not be empty".into()));
        }
        let handler = self.registry.resolve(&draft.op_type)?;
        let target = self
            .items
            .find_by_key(&draft.target)?
            .ok_or_else(|| Error::NotFound(format!("item {}", draft.target)))?;
        tracing::debug!(op_type = %draft.op_type, target = %draft.target,
            status = %OperationStatus::Validated, "operation validated");
        Ok((handler, target))
    }

    fn record(&self, draft: OperationDraft) -> Result<OperationRecord> {
        let record = OperationRecord {
            id: OperationId::new(self.space.clone(), Uuid::new_v4().to_string()),
            op_type: draft.op_type,
            target: draft.target,
            invoked_by: draft.invoked_by,
            attributes: draft.attributes,
            timestamp: Utc::now(),
        };
        self.store.save(&record)?;
        Ok(record)
    }

    /// Run an operation inline and return the handler's result.
    pub fn invoke(&self, draft: OperationDraft) -> Result<Value> {
        let (handler, target) = self.prepare(&draft)?;
        let record = self.record(draft)?;
        tracing::info!(id = %record.id, op_type = %record.op_type,
            status = %OperationStatus::DispatchedSync, "operation dispatched");
        match handler.invoke(&target, &record.attributes) {
            Ok(result) => {
                tracing::info!(id = %record.id, status = %OperationStatus::Completed,
                    "operation completed");
                Ok(result)
            }
            Err(err) => {
                tracing::error!(id = %record.id, status = %OperationStatus::Failed,
                    error = %err, "operation failed");
                Err(err)
            }
        }
    }

    /// Enqueue an operation for background execution and return the
    /// stored record as the acknowledgement. The handler's outcome is
    /// only visible in the logs.
    pub fn invoke_async(&self, draft: OperationDraft) -> Result<OperationRecord> {
        let (handler, target) = self.prepare(&draft)?;
        let record = self.record(draft)?;
        let job = Job {
            record: record.clone(),
            handler,
            target,
        };
        match self.queue.try_send(job) {
            Ok(()) => {
                tracing::info!(id = %record.id, op_type = %record.op_type,
                    status = %OperationStatus::DispatchedAsync, "operation enqueued");
                Ok(record)
            }
            Err(TrySendError::Full(job)) => {
                self.discard(&job.record);
                Err(Error::Overloaded(job.record.id.to_string()))
            }
            Err(TrySendError::Disconnected(job)) => {
                self.discard(&job.record);
                Err(Error::Storage(format!("dispatch workers gone: {}", job.record.id)))
            }
        }
    }

    /// Back out a record whose enqueue was rejected, so the operation
    /// log only holds accepted invocations.
    fn discard(&self, record: &OperationRecord) {
        if let Err(err) = self.store.delete(&record.id) {
            tracing::error!(id = %record.id, error = %err,
                "failed to back out rejected operation record");
        }
    }

    /// One page of stored operation records, newest first. Admin only.
    pub fn list_all(
        &self,
        users: &UserService,
        admin: &UserKey,
        size: usize,
        page: usize,
    ) -> Result<Vec<OperationRecord>> {
        users.require_role(admin, Role::Admin)?;
        if size == 0 {
            return Err(Error::Validation("page size must be positive".into()));
        }
        Ok(self.store.page(size, page)?)
    }

    /// Administrative purge of the operation log.
    pub fn delete_all(&self, users: &UserService, admin: &UserKey) -> Result<()> {
        users.require_role(admin, Role::Admin)?;
        self.store.delete_all()?;
        tracing::warn!(admin = %admin, "all operations purged");
        Ok(())
    }
}

fn run_job(job: Job) {
    match job.handler.invoke(&job.target, &job.record.attributes) {
        Ok(_) => tracing::info!(id = %job.record.id, op_type = %job.record.op_type,
            status = %OperationStatus::Completed, "operation completed"),
        Err(err) => tracing::error!(id = %job.record.id, op_type = %job.record.op_type,
            status = %OperationStatus::Failed, error = %err, "operation failed"),
    }
}
