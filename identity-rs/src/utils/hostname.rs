use crate::error::{IdentityError, Result};

/// Validate and normalize a DNS hostname.
///
/// Returns the lowercase hostname with any trailing dot stripped, or
/// `InvalidInput` when the syntax is not a valid RFC 1035 hostname.
pub fn validate_hostname(hostname: &str) -> Result<String> {
    let normalized = hostname.trim().trim_end_matches('.').to_lowercase();

    if normalized.is_empty() {
        return Err(IdentityError::InvalidInput(
            "Hostname is empty".to_string(),
        ));
    }

    if normalized.len() > 253 {
        return Err(IdentityError::InvalidInput(format!(
            "Hostname too long: {} characters (max 253)",
            normalized.len()
        )));
    }

    let labels: Vec<&str> = normalized.split('.').collect();
    if labels.len() < 2 {
        return Err(IdentityError::InvalidInput(format!(
            "Hostname must contain at least two labels: {}",
            normalized
        )));
    }

    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return Err(IdentityError::InvalidInput(format!(
                "Invalid label length in hostname: {}",
                normalized
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(IdentityError::InvalidInput(format!(
                "Label cannot start or end with a hyphen: {}",
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(IdentityError::InvalidInput(format!(
                "Invalid character in hostname label: {}",
                label
            )));
        }
    }

    Ok(normalized)
}
