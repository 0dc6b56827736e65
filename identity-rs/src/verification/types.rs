use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verification state of a sending domain.
///
/// Transitions: `unset -> pending -> {verified, failed} -> pending`.
/// Any settings change or explicit re-verify request re-enters `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// No domain configured yet.
    Unset,
    /// Domain configured, records not yet confirmed.
    Pending,
    /// A successful DNS comparison occurred for the current domain and key.
    Verified,
    /// A definitive mismatch or absence was observed.
    Failed,
}

impl VerificationStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unset" => Some(Self::Unset),
            "pending" => Some(Self::Pending),
            "verified" => Some(Self::Verified),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }
}

/// Structured reason attached to a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No DKIM TXT record found at the selector name.
    DkimMissing,
    /// A DKIM TXT record exists but does not match the generated value.
    DkimMismatch,
    /// No SPF record with the expected include mechanism.
    SpfMissing,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DkimMissing => "dkim_missing",
            Self::DkimMismatch => "dkim_mismatch",
            Self::SpfMissing => "spf_missing",
        }
    }
}

/// Result of one verification attempt.
///
/// Resolution and comparison failures are folded in here rather than raised
/// as errors; callers always get a structured, actionable outcome.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    /// Status after the attempt (unchanged when inconclusive).
    pub status: VerificationStatus,
    /// True when the domain verified successfully.
    pub success: bool,
    /// Structured failure reason, present when status is `failed`.
    pub reason: Option<FailureReason>,
    /// Human-readable, operator-actionable message.
    pub message: String,
    /// Whether a DMARC record was observed. Informational only; DMARC
    /// absence never blocks verification.
    pub dmarc_present: bool,
    /// True when the attempt could not reach DNS and no state changed.
    pub inconclusive: bool,
    pub attempted_at: DateTime<Utc>,
}

impl VerificationOutcome {
    pub fn verified(dmarc_present: bool, message: String) -> Self {
        Self {
            status: VerificationStatus::Verified,
            success: true,
            reason: None,
            message,
            dmarc_present,
            inconclusive: false,
            attempted_at: Utc::now(),
        }
    }

    pub fn failed(reason: FailureReason, dmarc_present: bool, message: String) -> Self {
        Self {
            status: VerificationStatus::Failed,
            success: false,
            reason: Some(reason),
            message,
            dmarc_present,
            inconclusive: false,
            attempted_at: Utc::now(),
        }
    }

    /// An attempt that reached no conclusion; `status` reports the stored
    /// status at the time of the attempt, unchanged.
    pub fn inconclusive(status: VerificationStatus, message: String) -> Self {
        Self {
            status,
            success: false,
            reason: None,
            message,
            dmarc_present: false,
            inconclusive: true,
            attempted_at: Utc::now(),
        }
    }
}
