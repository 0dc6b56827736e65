//! SQLite-backed settings store
//!
//! One `email_identity` row per organization with a monotonically increasing
//! `revision` column. Every write is a compare-and-swap on the revision the
//! caller read; a concurrent modification surfaces as `StaleWrite` so a
//! verification outcome can never silently overwrite a settings edit or
//! vice versa.

use crate::error::{IdentityError, Result};
use crate::keys::DkimKeyMaterial;
use crate::settings::types::{EmailIdentityConfig, SettingsPatch};
use crate::utils::{validate_email, validate_hostname};
use crate::verification::VerificationStatus;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

type ConfigRow = (
    String,         // org_id
    Option<String>, // domain
    String,         // provider
    Option<String>, // sender_name
    Option<String>, // sender_address
    Option<String>, // dkim_key_id
    Option<String>, // dkim_public_key
    String,         // verification_status
    Option<String>, // last_verification_attempt_at
    Option<String>, // last_verification_error
    i64,            // revision
);

#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<SqlitePool>,
    default_provider: String,
}

impl SettingsStore {
    /// Connect to the database and create the schema if needed.
    pub async fn new(database_url: &str, default_provider: &str) -> Result<Self> {
        let db = SqlitePool::connect(database_url).await?;
        Self::with_pool(db, default_provider).await
    }

    /// Build a store over an existing pool (used by tests).
    pub async fn with_pool(db: SqlitePool, default_provider: &str) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS email_identity (
                org_id TEXT PRIMARY KEY,
                domain TEXT,
                provider TEXT NOT NULL,
                sender_name TEXT,
                sender_address TEXT,
                dkim_key_id TEXT,
                dkim_public_key TEXT,
                verification_status TEXT NOT NULL,
                last_verification_attempt_at TEXT,
                last_verification_error TEXT,
                revision INTEGER NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self {
            db: Arc::new(db),
            default_provider: default_provider.to_string(),
        })
    }

    /// Fetch an organization's configuration.
    ///
    /// Organizations without a stored row get the in-memory `unset` default
    /// with revision 0; rows are only created on the first settings write.
    pub async fn get(&self, org_id: &str) -> Result<EmailIdentityConfig> {
        let row: Option<ConfigRow> = sqlx::query_as(
            r#"
            SELECT org_id, domain, provider, sender_name, sender_address,
                   dkim_key_id, dkim_public_key, verification_status,
                   last_verification_attempt_at, last_verification_error, revision
            FROM email_identity WHERE org_id = ?
            "#,
        )
        .bind(org_id)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => Self::config_from_row(row),
            None => Ok(EmailIdentityConfig::unset(org_id, &self.default_provider)),
        }
    }

    /// Apply a field-level patch, creating the row lazily on first write.
    ///
    /// A domain change forces verification back to `pending` (or `unset`
    /// when cleared) and invalidates any previously generated DKIM key: an
    /// old key for an abandoned domain must never be presented as current.
    pub async fn update(
        &self,
        org_id: &str,
        patch: &SettingsPatch,
        expected_revision: i64,
    ) -> Result<EmailIdentityConfig> {
        let current = self.get(org_id).await?;
        if current.revision != expected_revision {
            return Err(IdentityError::StaleWrite);
        }

        let mut next = current.clone();

        if let Some(domain) = &patch.domain {
            next.domain = if domain.trim().is_empty() {
                None
            } else {
                Some(validate_hostname(domain)?)
            };
        }

        if let Some(provider) = &patch.provider {
            next.provider = provider.clone();
        }

        if let Some(name) = &patch.sender_name {
            next.sender_name = if name.trim().is_empty() {
                None
            } else {
                Some(name.clone())
            };
        }

        if let Some(address) = &patch.sender_address {
            next.sender_address = if address.trim().is_empty() {
                None
            } else {
                Some(address.clone())
            };
        }

        if let Some(address) = &next.sender_address {
            let address_domain = validate_email(address)?;
            match &next.domain {
                Some(domain) if *domain == address_domain => {}
                Some(domain) => {
                    return Err(IdentityError::InvalidInput(format!(
                        "Sender address {} does not belong to configured domain {}",
                        address, domain
                    )));
                }
                None => {
                    return Err(IdentityError::InvalidInput(format!(
                        "Sender address {} set without a configured domain",
                        address
                    )));
                }
            }
        }

        if next.domain != current.domain {
            debug!(
                "Domain change for {}: {:?} -> {:?}",
                org_id, current.domain, next.domain
            );
            next.dkim_key_id = None;
            next.dkim_public_key = None;
            next.last_verification_attempt_at = None;
            next.last_verification_error = None;
            next.verification_status = if next.domain.is_some() {
                VerificationStatus::Pending
            } else {
                VerificationStatus::Unset
            };
        }

        self.write(&next, expected_revision).await?;
        next.revision = expected_revision + 1;

        info!("Updated email identity settings for {}", org_id);
        Ok(next)
    }

    /// Attach freshly generated DKIM key material.
    ///
    /// A regenerated key invalidates any prior successful comparison, so a
    /// `verified` status drops back to `pending`.
    pub async fn set_dkim_key(
        &self,
        org_id: &str,
        expected_revision: i64,
        key: &DkimKeyMaterial,
    ) -> Result<EmailIdentityConfig> {
        let current = self.get(org_id).await?;
        if current.revision != expected_revision {
            return Err(IdentityError::StaleWrite);
        }

        let mut next = current;
        next.dkim_key_id = Some(key.key_id.clone());
        next.dkim_public_key = Some(key.public_key.clone());
        if next.verification_status == VerificationStatus::Verified {
            next.verification_status = VerificationStatus::Pending;
        }

        self.write(&next, expected_revision).await?;
        next.revision = expected_revision + 1;

        info!("Stored DKIM key {} for {}", key.key_id, org_id);
        Ok(next)
    }

    /// Persist the result of a verification attempt.
    ///
    /// `status` is `None` for inconclusive attempts: the audit fields are
    /// updated but the stored status is left untouched.
    pub async fn record_verification_outcome(
        &self,
        org_id: &str,
        expected_revision: i64,
        status: Option<VerificationStatus>,
        error: Option<String>,
        attempted_at: DateTime<Utc>,
    ) -> Result<EmailIdentityConfig> {
        let current = self.get(org_id).await?;
        if current.revision != expected_revision {
            return Err(IdentityError::StaleWrite);
        }

        let mut next = current;
        if let Some(status) = status {
            next.verification_status = status;
        }
        next.last_verification_attempt_at = Some(attempted_at);
        next.last_verification_error = error;

        self.write(&next, expected_revision).await?;
        next.revision = expected_revision + 1;

        debug!(
            "Recorded verification outcome for {}: {}",
            org_id,
            next.verification_status.as_str()
        );
        Ok(next)
    }

    /// Compare-and-swap write: insert on first write, otherwise update
    /// guarded by the revision the caller read.
    async fn write(&self, config: &EmailIdentityConfig, expected_revision: i64) -> Result<()> {
        if expected_revision == 0 {
            let result = sqlx::query(
                r#"
                INSERT INTO email_identity
                    (org_id, domain, provider, sender_name, sender_address,
                     dkim_key_id, dkim_public_key, verification_status,
                     last_verification_attempt_at, last_verification_error, revision)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
                "#,
            )
            .bind(&config.org_id)
            .bind(&config.domain)
            .bind(&config.provider)
            .bind(&config.sender_name)
            .bind(&config.sender_address)
            .bind(&config.dkim_key_id)
            .bind(&config.dkim_public_key)
            .bind(config.verification_status.as_str())
            .bind(config.last_verification_attempt_at.map(|t| t.to_rfc3339()))
            .bind(&config.last_verification_error)
            .execute(&*self.db)
            .await;

            return match result {
                Ok(_) => Ok(()),
                // Row appeared between our read and write
                Err(sqlx::Error::Database(db))
                    if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
                {
                    Err(IdentityError::StaleWrite)
                }
                Err(e) => Err(e.into()),
            };
        }

        let result = sqlx::query(
            r#"
            UPDATE email_identity
            SET domain = ?, provider = ?, sender_name = ?, sender_address = ?,
                dkim_key_id = ?, dkim_public_key = ?, verification_status = ?,
                last_verification_attempt_at = ?, last_verification_error = ?,
                revision = revision + 1
            WHERE org_id = ? AND revision = ?
            "#,
        )
        .bind(&config.domain)
        .bind(&config.provider)
        .bind(&config.sender_name)
        .bind(&config.sender_address)
        .bind(&config.dkim_key_id)
        .bind(&config.dkim_public_key)
        .bind(config.verification_status.as_str())
        .bind(config.last_verification_attempt_at.map(|t| t.to_rfc3339()))
        .bind(&config.last_verification_error)
        .bind(&config.org_id)
        .bind(expected_revision)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::StaleWrite);
        }

        Ok(())
    }

    fn config_from_row(row: ConfigRow) -> Result<EmailIdentityConfig> {
        let (
            org_id,
            domain,
            provider,
            sender_name,
            sender_address,
            dkim_key_id,
            dkim_public_key,
            status,
            last_attempt,
            last_error,
            revision,
        ) = row;

        let verification_status = VerificationStatus::from_str(&status).ok_or_else(|| {
            IdentityError::Config(format!("Unknown verification status in store: {}", status))
        })?;

        Ok(EmailIdentityConfig {
            org_id,
            domain,
            provider,
            sender_name,
            sender_address,
            dkim_key_id,
            dkim_public_key,
            verification_status,
            last_verification_attempt_at: parse_timestamp(last_attempt)?,
            last_verification_error: last_error,
            revision,
        })
    }
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| {
                IdentityError::Config(format!("Invalid timestamp in store: {} ({})", raw, e))
            }),
    }
}
