//! Verification engine
//!
//! Resolves the expected DKIM/SPF/DMARC names, compares published values
//! against the generated records and advances the organization's
//! verification status.
//!
//! Matching rules:
//! - DKIM must match the generated value at tag level (whitespace stripped,
//!   tag names and `v=`/`k=` values case-insensitive, `p=` byte-exact).
//! - SPF must contain the expected `include:` mechanism; extra mechanisms
//!   from other senders are tolerated.
//! - DMARC presence is reported but never blocks verification.
//!
//! Concurrency: verification attempts for one organization are collapsed
//! into a single in-flight attempt. The attempt runs on a spawned task, so
//! a cancelled caller does not abort it and its result still reaches the
//! store for the next caller.

use crate::dns::records::RecordGenerator;
use crate::dns::resolver::TxtResolver;
use crate::error::{IdentityError, Result};
use crate::keys::spawn_generate_dkim_key;
use crate::settings::{EmailIdentityConfig, SettingsStore};
use crate::verification::types::{FailureReason, VerificationOutcome, VerificationStatus};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

type InflightVerify = Shared<BoxFuture<'static, VerificationOutcome>>;

#[derive(Clone)]
pub struct VerificationEngine {
    store: SettingsStore,
    resolver: Arc<dyn TxtResolver>,
    generator: RecordGenerator,
    inflight: Arc<Mutex<HashMap<String, InflightVerify>>>,
}

impl VerificationEngine {
    pub fn new(
        store: SettingsStore,
        resolver: Arc<dyn TxtResolver>,
        generator: RecordGenerator,
    ) -> Self {
        Self {
            store,
            resolver,
            generator,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run (or join) a verification attempt for an organization.
    ///
    /// Safe to call repeatedly; concurrent callers share one DNS round-trip
    /// and observe the same outcome.
    pub async fn verify(&self, org_id: &str) -> Result<VerificationOutcome> {
        let config = self.store.get(org_id).await?;
        if config.domain.is_none() {
            return Err(IdentityError::NotConfigured);
        }

        let flight = {
            let mut inflight = self.inflight.lock().unwrap();
            if let Some(existing) = inflight.get(org_id) {
                debug!("Joining in-flight verification for {}", org_id);
                existing.clone()
            } else {
                let engine = self.clone();
                let org = org_id.to_string();
                // The attempt runs detached so caller cancellation cannot
                // drop it mid-write.
                let handle = tokio::spawn(async move {
                    let outcome = engine.run_attempt(&org).await;
                    engine.inflight.lock().unwrap().remove(&org);
                    outcome
                });

                let flight: InflightVerify = async move {
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => VerificationOutcome::inconclusive(
                            VerificationStatus::Pending,
                            format!("Verification task failed: {}; retry", e),
                        ),
                    }
                }
                .boxed()
                .shared();

                inflight.insert(org_id.to_string(), flight.clone());
                flight
            }
        };

        Ok(flight.await)
    }

    async fn run_attempt(&self, org_id: &str) -> VerificationOutcome {
        info!("Verification attempt for {}", org_id);

        let config = match self.store.get(org_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!("Settings read failed for {}: {}", org_id, e);
                return VerificationOutcome::inconclusive(
                    VerificationStatus::Pending,
                    format!("Settings could not be read: {}; retry", e),
                );
            }
        };

        let Some(domain) = config.domain.clone() else {
            return VerificationOutcome::inconclusive(
                VerificationStatus::Unset,
                "No sending domain configured".to_string(),
            );
        };

        // Key material may not exist yet when verification is requested
        // before the records were ever fetched.
        let (config, key) = match config.dkim_key() {
            Some(key) => (config, key),
            None => {
                let material = match spawn_generate_dkim_key().await {
                    Ok(material) => material,
                    Err(e) => {
                        warn!("DKIM key generation failed for {}: {}", org_id, e);
                        return VerificationOutcome::inconclusive(
                            config.verification_status,
                            format!("Key material could not be generated: {}", e),
                        );
                    }
                };
                match self
                    .store
                    .set_dkim_key(org_id, config.revision, &material)
                    .await
                {
                    Ok(updated) => (updated, material),
                    Err(IdentityError::StaleWrite) => return self.stale_outcome(org_id).await,
                    Err(e) => {
                        return VerificationOutcome::inconclusive(
                            config.verification_status,
                            format!("Key material could not be stored: {}; retry", e),
                        )
                    }
                }
            }
        };

        let expected = match self.generator.generate(&domain, &key, &config.provider) {
            Ok(expected) => expected,
            Err(e) => {
                return VerificationOutcome::inconclusive(
                    config.verification_status,
                    format!("Expected records could not be generated: {}", e),
                )
            }
        };

        let dkim_values = match self.resolver.resolve_txt(&expected.dkim_record.name).await {
            Ok(values) => values,
            Err(e) => return self.record_inconclusive(org_id, &config, e).await,
        };
        let spf_values = match self.resolver.resolve_txt(&expected.spf_record.name).await {
            Ok(values) => values,
            Err(e) => return self.record_inconclusive(org_id, &config, e).await,
        };
        let dmarc_values = match self.resolver.resolve_txt(&expected.dmarc_record.name).await {
            Ok(values) => values,
            Err(e) => return self.record_inconclusive(org_id, &config, e).await,
        };

        let dmarc_present = dmarc_values.iter().any(|v| is_dmarc_record(v));
        let spf_ok = spf_values
            .iter()
            .any(|v| spf_matches(v, &expected.spf_record.value));

        let outcome = match check_dkim(&expected.dkim_record.value, &dkim_values) {
            DkimCheck::Match if spf_ok => {
                let mut message = format!("Domain {} verified: DKIM and SPF records match", domain);
                if !dmarc_present {
                    message.push_str(
                        "; no DMARC record found (recommended, not required)",
                    );
                }
                VerificationOutcome::verified(dmarc_present, message)
            }
            DkimCheck::Match => VerificationOutcome::failed(
                FailureReason::SpfMissing,
                dmarc_present,
                format!(
                    "No SPF record with the expected include mechanism found at {}; publish \"{}\"",
                    domain, expected.spf_record.value
                ),
            ),
            DkimCheck::Missing => VerificationOutcome::failed(
                FailureReason::DkimMissing,
                dmarc_present,
                format!(
                    "No DKIM record found at {}; publish the generated TXT record",
                    expected.dkim_record.name
                ),
            ),
            DkimCheck::Mismatch => VerificationOutcome::failed(
                FailureReason::DkimMismatch,
                dmarc_present,
                format!(
                    "The DKIM record at {} does not match the generated value; it may belong \
                     to an older key",
                    expected.dkim_record.name
                ),
            ),
        };

        let stored_error = if outcome.success {
            None
        } else {
            Some(outcome.message.clone())
        };

        match self
            .store
            .record_verification_outcome(
                org_id,
                config.revision,
                Some(outcome.status),
                stored_error,
                outcome.attempted_at,
            )
            .await
        {
            Ok(_) => {
                info!(
                    "Verification for {} finished: {}",
                    org_id,
                    outcome.status.as_str()
                );
                outcome
            }
            Err(IdentityError::StaleWrite) => self.stale_outcome(org_id).await,
            Err(e) => {
                warn!("Failed to persist verification outcome for {}: {}", org_id, e);
                VerificationOutcome::inconclusive(
                    config.verification_status,
                    format!("Outcome could not be stored: {}; retry", e),
                )
            }
        }
    }

    /// Resolution was unavailable: record the attempt, change no state.
    async fn record_inconclusive(
        &self,
        org_id: &str,
        config: &EmailIdentityConfig,
        error: IdentityError,
    ) -> VerificationOutcome {
        warn!("Verification for {} inconclusive: {}", org_id, error);

        let outcome = VerificationOutcome::inconclusive(
            config.verification_status,
            format!("DNS resolution unavailable: {}; safe to retry", error),
        );

        if let Err(e) = self
            .store
            .record_verification_outcome(
                org_id,
                config.revision,
                None,
                Some(outcome.message.clone()),
                outcome.attempted_at,
            )
            .await
        {
            // Audit-only write; the attempt stays inconclusive either way
            debug!("Could not record inconclusive attempt for {}: {}", org_id, e);
        }

        outcome
    }

    /// Settings changed underneath the attempt. Discard the result for the
    /// old configuration and report whatever is current now.
    async fn stale_outcome(&self, org_id: &str) -> VerificationOutcome {
        let status = self
            .store
            .get(org_id)
            .await
            .map(|c| c.verification_status)
            .unwrap_or(VerificationStatus::Pending);

        VerificationOutcome::inconclusive(
            status,
            "Settings changed during verification; outcome discarded, re-run verification"
                .to_string(),
        )
    }
}

enum DkimCheck {
    Match,
    Mismatch,
    Missing,
}

/// Classify the TXT values found at the DKIM name.
///
/// Values that do not look like DKIM records at all (no `p=` tag) count as
/// absence, not mismatch.
fn check_dkim(expected: &str, values: &[String]) -> DkimCheck {
    let mut saw_dkim_record = false;

    for value in values {
        if dkim_values_match(expected, value) {
            return DkimCheck::Match;
        }
        if tag_map(value).contains_key("p") {
            saw_dkim_record = true;
        }
    }

    if saw_dkim_record {
        DkimCheck::Mismatch
    } else {
        DkimCheck::Missing
    }
}

/// Tag-level DKIM comparison.
///
/// Tolerates whitespace and tag-name case differences; `v=` and `k=` values
/// compare case-insensitively, the `p=` key material byte-for-byte after
/// whitespace removal.
fn dkim_values_match(expected: &str, found: &str) -> bool {
    let expected_tags = tag_map(expected);
    let found_tags = tag_map(found);

    for (tag, expected_value) in &expected_tags {
        let Some(found_value) = found_tags.get(tag) else {
            return false;
        };

        let matches = match tag.as_str() {
            "v" | "k" => expected_value.eq_ignore_ascii_case(found_value),
            _ => expected_value == found_value,
        };

        if !matches {
            return false;
        }
    }

    true
}

/// Parse a `tag=value; tag=value` record into a map with lowercase tag
/// names and whitespace stripped from values.
fn tag_map(value: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();

    for pair in value.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        if let Some((tag, tag_value)) = pair.split_once('=') {
            tags.insert(
                tag.trim().to_lowercase(),
                tag_value.chars().filter(|c| !c.is_whitespace()).collect(),
            );
        }
    }

    tags
}

/// SPF match: an `v=spf1` record containing the expected `include:`
/// mechanism. Operators often combine several senders in one record, so
/// extra mechanisms are tolerated.
fn spf_matches(found: &str, expected_record: &str) -> bool {
    let found_lower = found.trim().to_lowercase();
    if !found_lower.starts_with("v=spf1") {
        return false;
    }

    let Some(include) = expected_record
        .split_whitespace()
        .find(|token| token.to_lowercase().starts_with("include:"))
    else {
        return false;
    };
    let include = include.to_lowercase();

    found_lower
        .split_whitespace()
        .any(|token| token == include)
}

fn is_dmarc_record(value: &str) -> bool {
    value.trim().to_lowercase().starts_with("v=dmarc1")
}
