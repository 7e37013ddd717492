//! §2.1 / Glossary "Seal": authenticated asymmetric encryption with a
//! fresh ephemeral sender key per call and a fixed, configured recipient
//! public key. This is libsodium's "sealed box" construction; `crypto_box`
//! exposes it directly so there is no hand-rolled nonce/key-exchange logic
//! here.

use base64::Engine;
use crypto_box::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::errors::BridgeError;

pub struct Sealer {
    recipient: PublicKey,
}

impl Sealer {
    /// `recipient_hex` is the recipient's X25519 public key, hex-encoded
    /// (the `secret_recipient_public_key` config option).
    pub fn from_hex(recipient_hex: &str) -> Result<Self, BridgeError> {
        let bytes = hex_decode(recipient_hex)
            .map_err(|e| BridgeError::Crypto(format!("invalid recipient key hex: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| BridgeError::Crypto("recipient key must be 32 bytes".to_string()))?;
        Ok(Sealer {
            recipient: PublicKey::from(arr),
        })
    }

    /// Seal `plaintext` under an ephemeral sender keypair generated for
    /// this call alone, then base64-encode the result for storage in a
    /// document store (Glossary: "the sealed blob is base64-encoded when
    /// stored in a document store").
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, BridgeError> {
        let sealed = crypto_box::seal(&mut OsRng, &self.recipient, plaintext)
            .map_err(|e| BridgeError::Crypto(format!("seal failed: {e}")))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }
}

/// Only used by tests to round-trip what `Sealer` produced -- no
/// `#[cfg(test)]` gate since integration tests under `tests/` link
/// against the crate's normal build, not its unit-test build.
pub fn open(secret_key: &SecretKey, sealed_b64: &str) -> anyhow::Result<Vec<u8>> {
    let sealed = base64::engine::general_purpose::STANDARD.decode(sealed_b64)?;
    let opened = crypto_box::seal_open(secret_key, &sealed)
        .map_err(|e| anyhow::anyhow!("seal_open failed: {e}"))?;
    Ok(opened)
}

fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_box::SecretKey;

    #[test]
    fn test_seal_then_open_round_trips() {
        let secret = SecretKey::generate(&mut OsRng);
        let public_hex = secret
            .public_key()
            .as_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        let sealer = Sealer::from_hex(&public_hex).unwrap();
        let sealed = sealer.seal(b"the authoritative dump").unwrap();

        let opened = open(&secret, &sealed).unwrap();
        assert_eq!(opened, b"the authoritative dump");
    }

    #[test]
    fn test_rejects_bad_hex_length() {
        assert!(Sealer::from_hex("deadbeef").is_err());
    }
}
