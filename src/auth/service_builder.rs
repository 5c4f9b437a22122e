use std::sync::Arc;

use crate::auth::config::AuthConfig;
use crate::auth::notifier::{LogNotifier, Notifier};
use crate::auth::service::CredentialService;
use crate::auth::storage::{KeyValueStore, MemoryStore};
use crate::AuthError;

/// A builder for creating a `CredentialService` instance.
///
/// This builder defaults to `MemoryStore` and `LogNotifier`, which is enough
/// for tests and single-instance development setups.
#[must_use = "The builder does nothing unless `.build_and_init()` is called."]
pub struct CredentialServiceBuilder<S: KeyValueStore> {
    config: AuthConfig,
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl CredentialServiceBuilder<MemoryStore> {
    pub(crate) fn new(config: AuthConfig) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl<S: KeyValueStore + 'static> CredentialServiceBuilder<S> {
    /// Specifies a custom store backend to use instead of the default `MemoryStore`.
    ///
    /// Every service instance that should share sessions and throttles must
    /// be given the same backing store.
    pub fn with_store<T: KeyValueStore + 'static>(
        self,
        store: Arc<T>,
    ) -> CredentialServiceBuilder<T> {
        CredentialServiceBuilder {
            config: self.config,
            store,
            notifier: self.notifier,
        }
    }

    /// Sets how OTP codes reach the user.
    pub fn with_notifier<N: Notifier + 'static>(mut self, notifier: N) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Builds and initializes the `CredentialService`.
    ///
    /// The configuration is validated first; settings that work but weaken
    /// security are logged as warnings. Then the store's `init()` runs, so a
    /// misconfigured backend fails here rather than on the first request.
    pub async fn build_and_init(self) -> Result<CredentialService<S>, AuthError> {
        self.config.validate()?;
        for warning in self.config.warnings() {
            tracing::warn!("{warning}");
        }

        let service = CredentialService::new(self.config, self.store, self.notifier)?;
        service.init().await?;

        tracing::debug!(config = %service.config.summary(), "credential service ready");
        Ok(service)
    }
}
