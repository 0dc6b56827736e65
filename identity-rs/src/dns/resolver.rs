//! Authoritative TXT resolution
//!
//! The verification engine only needs one operation: "what TXT values are
//! published at this name right now". That operation sits behind the
//! [`TxtResolver`] trait so tests can substitute a fake resolver while the
//! binary wires in [`SystemResolver`] over trust-dns.
//!
//! Failure semantics: record absence (NXDOMAIN, no records, lookup timeout)
//! is a normal operator state and resolves to an empty value set. Only
//! transport-level failures surface as `ResolutionUnavailable`, which the
//! engine treats as retryable.

use crate::error::{IdentityError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

/// TXT lookup seam used by the verification engine.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// Resolve all TXT values published at `name`, in resolver order.
    ///
    /// Returns an empty vector when the name does not exist or carries no
    /// TXT records.
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// Production resolver querying public DNS with caching disabled.
///
/// Verification results are meaningless when served from a stale cache
/// during propagation windows, so every attempt issues fresh queries.
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.cache_size = 0;

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

        Self { resolver }
    }
}

#[async_trait]
impl TxtResolver for SystemResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
        debug!("TXT lookup for {}", name);

        let lookup = match self.resolver.txt_lookup(name).await {
            Ok(lookup) => lookup,
            Err(e) => {
                return match e.kind() {
                    // Absence is a normal, expected state during setup
                    ResolveErrorKind::NoRecordsFound { .. } => {
                        debug!("No TXT records at {}", name);
                        Ok(Vec::new())
                    }
                    ResolveErrorKind::Timeout => {
                        debug!("TXT lookup for {} timed out", name);
                        Ok(Vec::new())
                    }
                    _ => {
                        warn!("TXT lookup for {} unavailable: {}", name, e);
                        Err(IdentityError::ResolutionUnavailable(e.to_string()))
                    }
                };
            }
        };

        // Some providers split long TXT values into adjacent character
        // strings; rejoin each record's fragments into one logical value.
        let values: Vec<String> = lookup
            .iter()
            .map(|record| {
                record
                    .txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part))
                    .collect::<String>()
            })
            .collect();

        debug!("Found {} TXT value(s) at {}", values.len(), name);
        Ok(values)
    }
}
