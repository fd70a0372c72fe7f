//! Keyed-hash signing primitive.
//!
//! Signatures are HMAC-SHA256 over the canonical encoding of an event's
//! envelope, emitted as lowercase hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Secret signing-key material, zeroed on drop.
#[derive(Clone)]
pub struct SigningKey(Zeroizing<Vec<u8>>);

impl SigningKey {
    /// Wrap opaque key material.
    #[must_use]
    pub fn new(material: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(material.into()))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

impl From<&str> for SigningKey {
    fn from(secret: &str) -> Self {
        Self::new(secret.as_bytes().to_vec())
    }
}

impl From<String> for SigningKey {
    fn from(secret: String) -> Self {
        Self::new(secret.into_bytes())
    }
}

/// Compute the hex HMAC-SHA256 of canonical text under the given key.
#[must_use]
pub(crate) fn compute_hmac(key: &SigningKey, canonical: &str) -> String {
    // HMAC-SHA256 accepts keys of any length, so new_from_slice cannot fail.
    let mut mac = HmacSha256::new_from_slice(&key.0)
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time equality over two hex signatures.
#[must_use]
pub(crate) fn hmac_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
