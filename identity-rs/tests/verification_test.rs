//! End-to-end verification engine tests against a fake resolver and an
//! in-memory settings store.

use async_trait::async_trait;
use identity_rs::dns::records::RecordGenerator;
use identity_rs::dns::resolver::TxtResolver;
use identity_rs::error::{IdentityError, Result};
use identity_rs::keys::DkimKeyMaterial;
use identity_rs::settings::{SettingsPatch, SettingsStore};
use identity_rs::verification::{FailureReason, VerificationEngine, VerificationStatus};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ORG: &str = "org-1";
const DOMAIN: &str = "example.org";
const SPF_INCLUDE: &str = "spf.platform.example";
const TEST_KEY_ID: &str = "test-key-1";
const TEST_PUBLIC_KEY: &str = "MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC6qxxX";

/// Scriptable resolver: published records, optional per-lookup delay,
/// switchable transport failure, lookup counter.
struct FakeResolver {
    records: Mutex<HashMap<String, Vec<String>>>,
    lookups: AtomicUsize,
    delay: Option<Duration>,
    unavailable: AtomicBool,
}

impl FakeResolver {
    fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
            delay: None,
            unavailable: AtomicBool::new(false),
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn publish(&self, name: &str, value: &str) {
        self.records
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxtResolver for FakeResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::ResolutionUnavailable(
                "resolver unreachable".to_string(),
            ));
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

struct Harness {
    store: SettingsStore,
    engine: VerificationEngine,
    generator: RecordGenerator,
    resolver: Arc<FakeResolver>,
}

async fn harness(resolver: FakeResolver) -> Harness {
    // A single connection keeps every query on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SettingsStore::with_pool(pool, "system").await.unwrap();

    let mut includes = HashMap::new();
    includes.insert("system".to_string(), SPF_INCLUDE.to_string());
    let generator = RecordGenerator::new(
        includes,
        "system".to_string(),
        "dmarc-reports@platform.example".to_string(),
    );

    let resolver = Arc::new(resolver);
    let engine = VerificationEngine::new(store.clone(), resolver.clone(), generator.clone());

    Harness {
        store,
        engine,
        generator,
        resolver,
    }
}

fn test_key() -> DkimKeyMaterial {
    DkimKeyMaterial {
        key_id: TEST_KEY_ID.to_string(),
        public_key: TEST_PUBLIC_KEY.to_string(),
    }
}

/// Configure the org with a domain and pre-seeded key material so tests
/// avoid real RSA generation.
async fn configure_org(h: &Harness) {
    let patch = SettingsPatch {
        domain: Some(DOMAIN.to_string()),
        ..Default::default()
    };
    h.store.update(ORG, &patch, 0).await.unwrap();
    h.store.set_dkim_key(ORG, 1, &test_key()).await.unwrap();
}

/// Publish DKIM + SPF records matching the generated values.
fn publish_matching_records(h: &Harness) {
    let expected = h
        .generator
        .generate(DOMAIN, &test_key(), "system")
        .unwrap();
    h.resolver
        .publish(&expected.dkim_record.name, &expected.dkim_record.value);
    h.resolver
        .publish(&expected.spf_record.name, &expected.spf_record.value);
}

// Scenario A: no DNS published at all.
#[tokio::test]
async fn verify_fails_with_dkim_missing_when_nothing_published() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;

    let outcome = h.engine.verify(ORG).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert_eq!(outcome.reason, Some(FailureReason::DkimMissing));

    let config = h.store.get(ORG).await.unwrap();
    assert_eq!(config.verification_status, VerificationStatus::Failed);
    assert!(config.last_verification_attempt_at.is_some());
    assert!(config.last_verification_error.is_some());
}

// Scenario B: DKIM + SPF published, DMARC absent.
#[tokio::test]
async fn verify_succeeds_without_dmarc() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;
    publish_matching_records(&h);

    let outcome = h.engine.verify(ORG).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert!(!outcome.dmarc_present);

    let config = h.store.get(ORG).await.unwrap();
    assert_eq!(config.verification_status, VerificationStatus::Verified);
    assert!(config.last_verification_error.is_none());
}

#[tokio::test]
async fn verify_reports_dmarc_when_published() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;
    publish_matching_records(&h);
    h.resolver.publish(
        &format!("_dmarc.{}", DOMAIN),
        "v=DMARC1; p=none; rua=mailto:dmarc-reports@platform.example",
    );

    let outcome = h.engine.verify(ORG).await.unwrap();
    assert!(outcome.success);
    assert!(outcome.dmarc_present);
}

// Scenario C: published DKIM differs only in tag case and whitespace.
#[tokio::test]
async fn verify_tolerates_dkim_normalization_differences() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;

    let expected = h
        .generator
        .generate(DOMAIN, &test_key(), "system")
        .unwrap();
    h.resolver.publish(
        &expected.dkim_record.name,
        &format!("V=dkim1;  K=RSA; p={} ", TEST_PUBLIC_KEY),
    );
    h.resolver
        .publish(DOMAIN, "v=spf1 include:spf.platform.example ~all");

    let outcome = h.engine.verify(ORG).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.status, VerificationStatus::Verified);
}

#[tokio::test]
async fn verify_fails_on_dkim_mismatch() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;

    let expected = h
        .generator
        .generate(DOMAIN, &test_key(), "system")
        .unwrap();
    h.resolver
        .publish(&expected.dkim_record.name, "v=DKIM1; k=rsa; p=SOMEOLDKEY");
    h.resolver
        .publish(DOMAIN, "v=spf1 include:spf.platform.example ~all");

    let outcome = h.engine.verify(ORG).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(FailureReason::DkimMismatch));
}

#[tokio::test]
async fn verify_fails_when_spf_include_absent() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;

    let expected = h
        .generator
        .generate(DOMAIN, &test_key(), "system")
        .unwrap();
    h.resolver
        .publish(&expected.dkim_record.name, &expected.dkim_record.value);
    // SPF exists but includes a different sender only
    h.resolver
        .publish(DOMAIN, "v=spf1 include:othersender.example ~all");

    let outcome = h.engine.verify(ORG).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(FailureReason::SpfMissing));
}

#[tokio::test]
async fn spf_with_extra_mechanisms_still_verifies() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;

    let expected = h
        .generator
        .generate(DOMAIN, &test_key(), "system")
        .unwrap();
    h.resolver
        .publish(&expected.dkim_record.name, &expected.dkim_record.value);
    h.resolver.publish(
        DOMAIN,
        "v=spf1 mx include:othersender.example include:spf.platform.example ~all",
    );

    let outcome = h.engine.verify(ORG).await.unwrap();
    assert!(outcome.success);
}

#[tokio::test]
async fn verify_without_domain_is_not_configured() {
    let h = harness(FakeResolver::new()).await;

    let result = h.engine.verify(ORG).await;
    assert!(matches!(result, Err(IdentityError::NotConfigured)));
}

#[tokio::test]
async fn verify_is_idempotent() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;
    publish_matching_records(&h);

    let first = h.engine.verify(ORG).await.unwrap();
    let second = h.engine.verify(ORG).await.unwrap();

    assert_eq!(first.status, second.status);
    assert!(second.success);

    let config = h.store.get(ORG).await.unwrap();
    assert_eq!(config.verification_status, VerificationStatus::Verified);
}

// A transient resolver outage must never downgrade a verified domain.
#[tokio::test]
async fn resolution_unavailable_never_downgrades_verified() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;
    publish_matching_records(&h);

    let outcome = h.engine.verify(ORG).await.unwrap();
    assert!(outcome.success);

    h.resolver.set_unavailable(true);
    let outcome = h.engine.verify(ORG).await.unwrap();

    assert!(outcome.inconclusive);
    assert!(!outcome.success);
    assert_eq!(outcome.status, VerificationStatus::Verified);

    let config = h.store.get(ORG).await.unwrap();
    assert_eq!(config.verification_status, VerificationStatus::Verified);
    // The attempt itself is still recorded
    assert!(config.last_verification_error.is_some());
}

// Concurrent verify calls collapse into one DNS round-trip.
#[tokio::test]
async fn concurrent_verifies_share_one_attempt() {
    let h = harness(FakeResolver::with_delay(Duration::from_millis(100))).await;
    configure_org(&h).await;
    publish_matching_records(&h);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move { engine.verify(ORG).await }));
    }

    let mut statuses = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        statuses.push(outcome.status);
    }

    assert!(statuses
        .iter()
        .all(|s| *s == VerificationStatus::Verified));
    // One attempt resolves exactly three names (dkim, spf, dmarc)
    assert_eq!(h.resolver.lookup_count(), 3);
}

// A caller that goes away mid-attempt must not abort the attempt; the
// outcome still reaches the store for the next caller.
#[tokio::test]
async fn cancelled_caller_does_not_abort_attempt() {
    let h = harness(FakeResolver::with_delay(Duration::from_millis(50))).await;
    configure_org(&h).await;
    publish_matching_records(&h);

    let engine = h.engine.clone();
    let caller = tokio::spawn(async move { engine.verify(ORG).await });

    // Let the attempt get into resolution, then drop the caller
    tokio::time::sleep(Duration::from_millis(20)).await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    // The detached attempt finishes all three lookups and persists
    let mut config = h.store.get(ORG).await.unwrap();
    for _ in 0..50 {
        if config.verification_status == VerificationStatus::Verified {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        config = h.store.get(ORG).await.unwrap();
    }

    assert_eq!(config.verification_status, VerificationStatus::Verified);
    assert!(config.last_verification_attempt_at.is_some());
    assert_eq!(h.resolver.lookup_count(), 3);
}

// Scenario D: settings change mid-verification discards the stale outcome.
#[tokio::test]
async fn domain_change_mid_verification_discards_outcome() {
    let h = harness(FakeResolver::with_delay(Duration::from_millis(100))).await;
    configure_org(&h).await;
    publish_matching_records(&h);

    let engine = h.engine.clone();
    let verify_handle = tokio::spawn(async move { engine.verify(ORG).await });

    // Let the attempt get past its config read and into resolution
    tokio::time::sleep(Duration::from_millis(30)).await;

    let config = h.store.get(ORG).await.unwrap();
    let patch = SettingsPatch {
        domain: Some("b.com".to_string()),
        ..Default::default()
    };
    h.store.update(ORG, &patch, config.revision).await.unwrap();

    let outcome = verify_handle.await.unwrap().unwrap();

    // The old domain's result never reaches the new configuration
    assert!(outcome.inconclusive);
    assert!(!outcome.success);

    let config = h.store.get(ORG).await.unwrap();
    assert_eq!(config.domain.as_deref(), Some("b.com"));
    assert_eq!(config.verification_status, VerificationStatus::Pending);
    assert!(config.dkim_key_id.is_none());
}

#[tokio::test]
async fn reverify_after_domain_change_uses_new_domain() {
    let h = harness(FakeResolver::new()).await;
    configure_org(&h).await;
    publish_matching_records(&h);

    let outcome = h.engine.verify(ORG).await.unwrap();
    assert!(outcome.success);

    let config = h.store.get(ORG).await.unwrap();
    let patch = SettingsPatch {
        domain: Some("b.com".to_string()),
        ..Default::default()
    };
    let updated = h.store.update(ORG, &patch, config.revision).await.unwrap();

    // Status reset immediately, before any new verification
    assert_eq!(updated.verification_status, VerificationStatus::Pending);

    // Seed a key for the new domain; its records are not published, so
    // verification must fail rather than reuse the old domain's result
    h.store
        .set_dkim_key(ORG, updated.revision, &test_key())
        .await
        .unwrap();
    let outcome = h.engine.verify(ORG).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(FailureReason::DkimMissing));
}
