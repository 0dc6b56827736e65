//! Domain verification
//!
//! Compares the generated DKIM/SPF/DMARC records against what is actually
//! published in DNS and drives the per-organization verification state
//! machine.
//!
//! - [`types`]: status enum, failure reasons, attempt outcome
//! - [`engine`]: state machine, matching rules, per-organization single-flight

pub mod engine;
pub mod types;

pub use engine::VerificationEngine;
pub use types::{FailureReason, VerificationOutcome, VerificationStatus};
