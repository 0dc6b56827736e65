//! DKIM key material generation
//!
//! Generates the RSA key pair published in DNS for DKIM and derives the
//! selector label from the key id. The selector is a pure function of the
//! key id, so it only changes when the key itself is regenerated and
//! historical records stay valid during rotation windows.

use crate::error::{IdentityError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

/// RSA key size for DKIM keys. 2048 is the common operational choice;
/// larger keys exceed the 255-byte TXT character-string limit on some
/// providers.
const DKIM_KEY_BITS: usize = 2048;

/// Length of the hex digest prefix used in the selector label.
const SELECTOR_DIGEST_LEN: usize = 12;

/// Generated DKIM key material.
///
/// Only the public half is retained; nothing here is secret, the record
/// value is meant to be published in DNS verbatim.
#[derive(Debug, Clone)]
pub struct DkimKeyMaterial {
    /// Opaque key id; the selector is derived from it.
    pub key_id: String,
    /// Base64-encoded SubjectPublicKeyInfo DER, as used in the `p=` tag.
    pub public_key: String,
}

/// Generate a fresh DKIM RSA key pair and return the publishable half.
pub fn generate_dkim_key() -> Result<DkimKeyMaterial> {
    let key_id = Uuid::new_v4().to_string();

    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, DKIM_KEY_BITS)
        .map_err(|e| IdentityError::KeyMaterial(format!("RSA key generation failed: {}", e)))?;

    let public_key_der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| IdentityError::KeyMaterial(format!("Public key encoding failed: {}", e)))?;

    let public_key = BASE64.encode(public_key_der.as_bytes());

    info!(
        "Generated DKIM key {} (selector {})",
        key_id,
        dkim_selector(&key_id)
    );

    Ok(DkimKeyMaterial { key_id, public_key })
}

/// Generate a fresh DKIM key pair on the blocking thread pool.
///
/// RSA-2048 generation can take hundreds of milliseconds, long enough to
/// stall an executor worker, so async callers go through here.
pub async fn spawn_generate_dkim_key() -> Result<DkimKeyMaterial> {
    tokio::task::spawn_blocking(generate_dkim_key)
        .await
        .map_err(|e| IdentityError::KeyMaterial(format!("Key generation task failed: {}", e)))?
}

/// Derive the DKIM selector label from a key id.
///
/// Deterministic: the same key id always yields the same selector, and two
/// different key ids yield different selectors for all practical purposes.
pub fn dkim_selector(key_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_id.as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    format!("key{}", &hex[..SELECTOR_DIGEST_LEN])
}
