use crate::context::AccessPolicy;
use ingest::{IngestStore, Ingestor};
use std::sync::Arc;

pub struct AppState {
    pub ingestor: Ingestor,
    pub store: Arc<dyn IngestStore>,
    pub policy: AccessPolicy,
}

impl AppState {
    pub fn new(ingestor: Ingestor, policy: AccessPolicy) -> Self {
        Self {
            store: ingestor.store().clone(),
            ingestor,
            policy,
        }
    }
}
