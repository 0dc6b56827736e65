//! identity-rs: domain-identity verification for email sending
//!
//! Verifies that an organization controls the domain it wants to send email
//! from: generates the DKIM/SPF/DMARC records the operator must publish,
//! persists per-organization email configuration, and checks via live TXT
//! lookups that the records are actually in place before the domain is
//! trusted as a sending identity.
//!
//! # Example
//!
//! ```no_run
//! use identity_rs::config::Config;
//! use identity_rs::dns::{RecordGenerator, SystemResolver};
//! use identity_rs::settings::SettingsStore;
//! use identity_rs::verification::VerificationEngine;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = SettingsStore::new(
//!         &config.storage.database_url,
//!         &config.email.default_provider,
//!     )
//!     .await?;
//!
//!     let generator = RecordGenerator::new(
//!         config.email.spf_includes.clone(),
//!         config.email.default_provider.clone(),
//!         config.email.dmarc_report_address.clone(),
//!     );
//!     let resolver = Arc::new(SystemResolver::new(Duration::from_secs(
//!         config.email.dns_timeout_secs,
//!     )));
//!     let engine = VerificationEngine::new(store.clone(), resolver, generator);
//!
//!     let outcome = engine.verify("org-1").await?;
//!     println!("Status: {}", outcome.status.as_str());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`dns`]: Record generation and TXT resolution
//! - [`keys`]: DKIM key material generation
//! - [`settings`]: Per-organization settings persistence
//! - [`verification`]: Verification engine and state machine
//! - [`api`]: REST boundary for the consuming UI layer
//! - [`utils`]: Hostname and email validation

pub mod api;
pub mod config;
pub mod dns;
pub mod error;
pub mod keys;
pub mod settings;
pub mod utils;
pub mod verification;

// Re-export commonly used types
pub use config::Config;
pub use error::{IdentityError, Result};
