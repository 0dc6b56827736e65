use crate::keys::DkimKeyMaterial;
use crate::verification::VerificationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-organization email sending configuration.
///
/// One record per organization, created lazily on first settings write and
/// never hard-deleted; clearing the domain returns it to `unset`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailIdentityConfig {
    pub org_id: String,
    /// Sending domain, lowercase, syntactically valid when present.
    pub domain: Option<String>,
    /// Sending provider; the "system" sentinel means platform-managed.
    pub provider: String,
    pub sender_name: Option<String>,
    /// Display sender address; must share the configured domain.
    pub sender_address: Option<String>,
    pub dkim_key_id: Option<String>,
    /// Base64 DKIM public key. Only public material is ever stored.
    pub dkim_public_key: Option<String>,
    pub verification_status: VerificationStatus,
    pub last_verification_attempt_at: Option<DateTime<Utc>>,
    pub last_verification_error: Option<String>,
    /// Monotonic optimistic-concurrency token.
    pub revision: i64,
}

impl EmailIdentityConfig {
    /// The in-memory default for an organization with no stored row yet.
    pub fn unset(org_id: &str, default_provider: &str) -> Self {
        Self {
            org_id: org_id.to_string(),
            domain: None,
            provider: default_provider.to_string(),
            sender_name: None,
            sender_address: None,
            dkim_key_id: None,
            dkim_public_key: None,
            verification_status: VerificationStatus::Unset,
            last_verification_attempt_at: None,
            last_verification_error: None,
            revision: 0,
        }
    }

    /// Current DKIM key material, when both halves are present.
    pub fn dkim_key(&self) -> Option<DkimKeyMaterial> {
        match (&self.dkim_key_id, &self.dkim_public_key) {
            (Some(key_id), Some(public_key)) => Some(DkimKeyMaterial {
                key_id: key_id.clone(),
                public_key: public_key.clone(),
            }),
            _ => None,
        }
    }
}

/// Field-level settings patch; unspecified fields are left unchanged.
///
/// An empty-string `domain` clears the domain and returns the organization
/// to the `unset` state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub domain: Option<String>,
    pub provider: Option<String>,
    pub sender_name: Option<String>,
    pub sender_address: Option<String>,
}
