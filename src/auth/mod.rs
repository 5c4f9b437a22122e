// Core architecture components
mod config;
mod error;
mod service;
mod service_builder;
mod time_utils;

// Building blocks of the credential flow
pub mod challenge;
pub mod keys;
pub mod ledger;
pub mod notifier;
pub mod throttle;
pub mod token;

// Storage backends
pub mod storage;

// Core components exports
pub use config::{AuthConfig, ConfigPreset, ThrottleConfig};
pub use error::AuthError;
pub use service::CredentialService;
pub use service_builder::CredentialServiceBuilder;

// Building block exports
pub use challenge::{Challenge, ChallengeIssuer, ChallengePolicy, Redemption};
pub use ledger::SessionLedger;
pub use notifier::{LogNotifier, Notifier};
pub use throttle::{Operation, Throttle};
pub use token::{TokenClaims, TokenMinter, TokenPair, TokenScope};

// Storage exports
pub use storage::{KeyValueStore, MemoryStore, StorageStats};
#[cfg(feature = "redis-storage")]
pub use storage::RedisStore;
