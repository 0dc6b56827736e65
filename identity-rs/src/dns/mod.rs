//! DNS record generation and resolution
//!
//! - [`records`]: expected DKIM/SPF/DMARC record generation
//! - [`resolver`]: authoritative TXT lookups behind a trait seam

pub mod records;
pub mod resolver;

pub use records::{DnsRecord, DnsRecordSet, RecordGenerator};
pub use resolver::{SystemResolver, TxtResolver};
