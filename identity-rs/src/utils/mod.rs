//! Utility modules
//!
//! Validation helpers shared by the settings store and record generator:
//! - [`hostname`]: DNS hostname syntax validation (RFC 1035)
//! - [`email`]: Email address validation (RFC 5321)

pub mod email;
pub mod hostname;

pub use email::validate_email;
pub use hostname::validate_hostname;
