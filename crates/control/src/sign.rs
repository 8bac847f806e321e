//! HMAC signing for `ServerToAgent` frames.
//!
//! OpAMP itself doesn't mandate a signature on the HTTP transport; this is
//! an additional integrity guard for operators who terminate OpAMP behind
//! a proxy that cannot itself verify mTLS. Agents that don't check the
//! header are unaffected (§9: secret handling notes list the config hash,
//! not this signature, as load-bearing for the agent's own drift
//! detection).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies `ServerToAgent` response bodies with a single shared
/// key, configured via `OPAMP_SIGNING_KEY`.
#[derive(Clone)]
pub struct ResponseSigner {
	key: Vec<u8>,
}

impl ResponseSigner {
	pub fn new(key: &str) -> Self {
		Self {
			key: key.as_bytes().to_vec(),
		}
	}

	/// Returns the lowercase hex HMAC-SHA256 of `body`, suitable for an
	/// `X-HDX-Signature` response header.
	pub fn sign(&self, body: &[u8]) -> String {
		let mut mac =
			HmacSha256::new_from_slice(&self.key).expect("HMAC accepts a key of any length");
		mac.update(body);
		hex::encode(mac.finalize().into_bytes())
	}

	pub fn verify(&self, body: &[u8], signature_hex: &str) -> bool {
		let Ok(expected) = hex::decode(signature_hex) else {
			return false;
		};
		let mut mac =
			HmacSha256::new_from_slice(&self.key).expect("HMAC accepts a key of any length");
		mac.update(body);
		mac.verify_slice(&expected).is_ok()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sign_is_deterministic_for_the_same_key_and_body() {
		let signer = ResponseSigner::new("k1");
		assert_eq!(signer.sign(b"hello"), signer.sign(b"hello"));
	}

	#[test]
	fn verify_accepts_a_matching_signature() {
		let signer = ResponseSigner::new("k1");
		let sig = signer.sign(b"payload");
		assert!(signer.verify(b"payload", &sig));
	}

	#[test]
	fn verify_rejects_a_tampered_body() {
		let signer = ResponseSigner::new("k1");
		let sig = signer.sign(b"payload");
		assert!(!signer.verify(b"tampered", &sig));
	}

	#[test]
	fn different_keys_produce_different_signatures() {
		let a = ResponseSigner::new("k1").sign(b"same");
		let b = ResponseSigner::new("k2").sign(b"same");
		assert_ne!(a, b);
	}
}
