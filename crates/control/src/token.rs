//! Ingestion token codec (C1): generation, hashing, and prefixing of the
//! bearer credential collectors use to authenticate OTLP traffic.
//!
//! The plaintext token is never persisted; [`TokenRegistry`] (in
//! [`crate::registry`]) only ever stores [`hash`] and [`prefix`] of it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

pub const TOKEN_MARKER: &str = "hdx_ingest_";
pub const PREFIX_LEN: usize = 12;

/// Generates a new plaintext token: `hdx_ingest_` followed by the
/// base64url encoding of 256 bits from a cryptographically strong RNG.
/// ~43 body characters, for a total length of 54 ± 1.
pub fn generate() -> String {
	let mut bytes = [0u8; 32];
	rand::rng().fill_bytes(&mut bytes);
	format!("{TOKEN_MARKER}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Lowercase hex SHA-256 of the plaintext token. The only form of the token
/// ever written to durable storage.
pub fn hash(token: &str) -> String {
	let digest = Sha256::digest(token.as_bytes());
	hex::encode(digest)
}

/// First 12 characters of the plaintext token (the marker plus the first
/// character of the random body), safe to display in a UI and safe to log.
pub fn prefix(token: &str) -> String {
	token.chars().take(PREFIX_LEN).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_tokens_have_the_documented_shape() {
		let token = generate();
		assert!(token.starts_with(TOKEN_MARKER));
		let total_len = token.chars().count();
		assert!(
			(53..=55).contains(&total_len),
			"token length {total_len} outside 54±1"
		);
	}

	#[test]
	fn generate_is_not_deterministic() {
		assert_ne!(generate(), generate());
	}

	#[test]
	fn hash_is_deterministic_and_hex() {
		let token = generate();
		let h1 = hash(&token);
		let h2 = hash(&token);
		assert_eq!(h1, h2);
		assert_eq!(h1.len(), 64);
		assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn distinct_tokens_hash_differently() {
		assert_ne!(hash(&generate()), hash(&generate()));
	}

	#[test]
	fn prefix_includes_marker_and_first_body_char() {
		let token = generate();
		let p = prefix(&token);
		assert_eq!(p.chars().count(), PREFIX_LEN);
		assert!(token.starts_with(&p));
	}

	proptest::proptest! {
		/// P1 (uniqueness) precondition: distinct plaintexts hash to
		/// distinct hex digests, for any pair of arbitrary token-shaped
		/// strings, not just generated ones.
		#[test]
		fn hash_is_injective_over_arbitrary_strings(a in ".{0,64}", b in ".{0,64}") {
			proptest::prop_assume!(a != b);
			proptest::prop_assert_ne!(hash(&a), hash(&b));
		}

		/// `prefix` never panics or produces fewer than the documented
		/// number of characters for any string at least that long.
		#[test]
		fn prefix_is_stable_over_arbitrary_strings(body in "[a-zA-Z0-9_-]{12,64}") {
			let token = format!("{TOKEN_MARKER}{body}");
			let p = prefix(&token);
			proptest::prop_assert_eq!(p.chars().count(), PREFIX_LEN);
			proptest::prop_assert!(token.starts_with(&p));
		}
	}
}
