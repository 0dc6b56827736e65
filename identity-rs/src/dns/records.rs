//! Expected DNS record generation
//!
//! Produces the DKIM/SPF/DMARC TXT records an operator must publish before
//! their domain is trusted as a sending identity. Generation is a pure
//! function of the domain, the key material and the provider: identical
//! inputs always produce byte-identical records and instructions.

use crate::error::{IdentityError, Result};
use crate::keys::{dkim_selector, DkimKeyMaterial};
use crate::utils::validate_hostname;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default TTL suggested to operators for the generated records.
const RECORD_TTL: u32 = 3600;

/// A single expected DNS record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Record type; always "TXT" for sender identity records.
    pub record_type: String,
    /// Hostname the record must be published at.
    pub name: String,
    /// Expected record value.
    pub value: String,
    /// Suggested TTL in seconds.
    pub ttl: u32,
    /// Description/purpose shown to the operator.
    pub purpose: String,
}

impl DnsRecord {
    fn txt(name: String, value: String, purpose: &str) -> Self {
        DnsRecord {
            record_type: "TXT".to_string(),
            name,
            value,
            ttl: RECORD_TTL,
            purpose: purpose.to_string(),
        }
    }
}

/// The full set of records for one domain, plus setup instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecordSet {
    pub dkim_record: DnsRecord,
    pub spf_record: DnsRecord,
    pub dmarc_record: DnsRecord,
    pub instructions: Vec<String>,
}

/// Generator for expected sender identity records.
#[derive(Debug, Clone)]
pub struct RecordGenerator {
    spf_includes: HashMap<String, String>,
    default_provider: String,
    dmarc_report_address: String,
}

impl RecordGenerator {
    pub fn new(
        spf_includes: HashMap<String, String>,
        default_provider: String,
        dmarc_report_address: String,
    ) -> Self {
        RecordGenerator {
            spf_includes,
            default_provider,
            dmarc_report_address,
        }
    }

    /// Generate the expected DKIM, SPF and DMARC records for a domain.
    ///
    /// # Arguments
    /// * `domain` - Sending domain (e.g. "example.com")
    /// * `key` - DKIM key material previously generated for this domain
    /// * `provider` - Sending provider name, mapped to an SPF include host
    pub fn generate(
        &self,
        domain: &str,
        key: &DkimKeyMaterial,
        provider: &str,
    ) -> Result<DnsRecordSet> {
        let domain = validate_hostname(domain)?;

        if key.public_key.is_empty() {
            return Err(IdentityError::KeyMaterial(format!(
                "No public key material for key id {}",
                key.key_id
            )));
        }

        let spf_include = self
            .spf_includes
            .get(provider)
            .or_else(|| self.spf_includes.get(&self.default_provider))
            .ok_or_else(|| {
                IdentityError::Config(format!("No SPF include configured for provider {}", provider))
            })?;

        let selector = dkim_selector(&key.key_id);

        let dkim_record = DnsRecord::txt(
            format!("{}._domainkey.{}", selector, domain),
            format!("v=DKIM1; k=rsa; p={}", key.public_key),
            "DKIM public key for email signing",
        );

        // Soft-fail only: a hard-fail policy would break legitimate mail
        // while records are still propagating.
        let spf_record = DnsRecord::txt(
            domain.clone(),
            format!("v=spf1 include:{} ~all", spf_include),
            "SPF policy authorizing the sending provider",
        );

        // Monitor-only policy. Enforcement (p=quarantine/p=reject) is a
        // separate, explicit operator action.
        let dmarc_record = DnsRecord::txt(
            format!("_dmarc.{}", domain),
            format!(
                "v=DMARC1; p=none; rua=mailto:{}",
                self.dmarc_report_address
            ),
            "DMARC monitoring policy with aggregate reporting",
        );

        let instructions = Self::build_instructions(&domain, &[&dkim_record, &spf_record, &dmarc_record]);

        Ok(DnsRecordSet {
            dkim_record,
            spf_record,
            dmarc_record,
            instructions,
        })
    }

    /// Ordered, human-readable setup steps for the operator.
    fn build_instructions(domain: &str, records: &[&DnsRecord]) -> Vec<String> {
        let mut instructions = Vec::new();

        instructions.push(format!(
            "Add the following TXT records to the DNS zone for {}:",
            domain
        ));

        for record in records {
            instructions.push(format!(
                "TXT record at \"{}\" with value \"{}\" (TTL {} seconds) - {}",
                record.name, record.value, record.ttl, record.purpose
            ));
        }

        instructions.push(
            "DNS changes can take up to 48 hours to propagate. Run verification once \
             the records are visible."
                .to_string(),
        );
        instructions.push(format!(
            "You can check propagation with: dig TXT {}",
            records[0].name
        ));

        instructions
    }
}
