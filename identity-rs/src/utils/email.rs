use crate::error::{IdentityError, Result};

/// Basic email address validation, returning the domain part.
pub fn validate_email(email: &str) -> Result<String> {
    if email.is_empty() {
        return Err(IdentityError::InvalidInput("Email is empty".to_string()));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(IdentityError::InvalidInput(format!(
            "Invalid email format: {}",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(IdentityError::InvalidInput(
            "Email parts cannot be empty".to_string(),
        ));
    }

    if !domain.contains('.') {
        return Err(IdentityError::InvalidInput(
            "Email domain must contain a dot".to_string(),
        ));
    }

    Ok(domain.to_lowercase())
}
