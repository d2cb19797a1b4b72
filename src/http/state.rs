//! Application state for the HTTP server.

use std::sync::Arc;

use crate::db::repository::FullRepository;
use crate::models::{CredentialHasher, Sha256Hasher};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository instance for database operations
    pub repository: Arc<dyn FullRepository>,
    /// Credential digest seam used by the account endpoints
    pub hasher: Arc<dyn CredentialHasher>,
}

impl AppState {
    /// Create a new application state with the given repository and the
    /// default hasher.
    pub fn new(repository: Arc<dyn FullRepository>) -> Self {
        Self {
            repository,
            hasher: Arc::new(Sha256Hasher),
        }
    }

    /// Replace the credential hasher.
    pub fn with_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }
}
