//! Application state shared across handlers.

use std::sync::Arc;

use tp_core::store::{MemoryStore, TaskStore, UserStore};
use tp_core::{
    ApprovalEngine, MemoryTokenStore, ReconciliationProcessor, RequestLedger, SubmissionService,
    TokenStore,
};

/// Shared application state: the entity stores plus the workflow engines
/// wired over them.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub ledger: Arc<RequestLedger>,
    pub approvals: Arc<ApprovalEngine>,
    pub submissions: Arc<SubmissionService>,
    pub reconciler: Arc<ReconciliationProcessor>,
}

impl AppState {
    /// State over a fresh in-memory store with default token lifetimes.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryTokenStore::new()))
    }

    /// State over the given store and token store. The single `MemoryStore`
    /// backs every repository trait, so the workflow engines share one
    /// transaction boundary.
    pub fn new(store: Arc<MemoryStore>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            users: store.clone(),
            tasks: store.clone(),
            tokens,
            ledger: Arc::new(RequestLedger::new(store.clone(), store.clone())),
            approvals: Arc::new(ApprovalEngine::new(store.clone(), store.clone())),
            submissions: Arc::new(SubmissionService::new(store.clone(), store.clone())),
            reconciler: Arc::new(ReconciliationProcessor::new(
                store.clone(),
                store.clone(),
                store,
            )),
        }
    }
}
