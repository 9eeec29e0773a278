//! AAA policy and accounting core
//!
//! This crate sits behind a RADIUS protocol bridge. It resolves the
//! effective service policy of an account, enforces concurrent-session
//! limits, and keeps online sessions and accounting history consistent
//! across the accounting lifecycle.
//!
//! # Features
//!
//! - Static and dynamic account/profile linkage with per-account overrides
//! - Read-through profile cache with a background sweeper
//! - Short-lived per-user session count cache for admission control
//! - Exact 64-bit byte totals from wrapped 32-bit counters
//! - Schema-validated runtime settings
//! - In-memory storage, PostgreSQL with the `postgres` feature
//!
//! # Example
//!
//! ```rust,no_run
//! use aaa_core::{AaaService, Admission, CoreConfig};
//! use aaa_core::model::{Account, ProfileLinkMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::default();
//!     let (service, _store) = AaaService::in_memory(&config).await?;
//!
//!     let account = Account::new(1, "alice", 1).with_link_mode(ProfileLinkMode::Dynamic);
//!     let policy = account.effective_policy(Some(&service.profiles)).await;
//!     println!("up rate: {} Kbps", policy.up_rate);
//!
//!     if let Admission::Reject(reason) = service.admission.check(&account).await? {
//!         println!("rejected: {}", reason);
//!     }
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod accounting;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod profile_cache;
pub mod service;
pub mod session;
pub mod settings;
pub mod store;

pub use accounting::AccountingRepository;
pub use cache::{CacheStats, TimedCache};
pub use config::{ConfigError, CoreConfig, PostgresConfig};
pub use error::{Error, Result, StoreError};
pub use handler::{AccountingDispatcher, AcctOutcome, Admission, AdmissionControl};
pub use metrics::{AaaMetrics, MetricsSnapshot};
pub use policy::{apply_link_mode, EffectivePolicy};
pub use profile_cache::{ProfileCache, ProfileCacheConfig, ProfileCacheStats};
pub use service::{AaaService, Storage};
pub use session::SessionRepository;
pub use settings::SettingsStore;
