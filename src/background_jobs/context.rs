use crate::catalog_store::GameCatalog;
use crate::server_store::ServerStore;
use crate::user::FullUserStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains references to shared resources and a cancellation token
/// for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Accounts and their game libraries.
    pub user_store: Arc<dyn FullUserStore>,

    /// The game catalog.
    pub catalog: Arc<dyn GameCatalog>,

    /// Job history, schedules, audit and action logs.
    pub server_store: Arc<dyn ServerStore>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        user_store: Arc<dyn FullUserStore>,
        catalog: Arc<dyn GameCatalog>,
        server_store: Arc<dyn ServerStore>,
    ) -> Self {
        Self {
            cancellation_token,
            user_store,
            catalog,
            server_store,
        }
    }

    /// Same resources, different cancellation token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
