//! Helpers for turning user supplied strings into names that are safe to use for Kubernetes
//! objects and DNS labels.
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

/// The longest a single DNS label is allowed to be
pub const MAX_DNS_LABEL_LENGTH: usize = 63;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

lazy_static! {
    static ref NOT_DNS_SAFE: Regex = Regex::new(r"[^a-z0-9-]").unwrap();
}

/// Returns the lower case hex encoded sha256 of the input
pub fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Returns the lower case, unpadded base32 (RFC 4648 alphabet) encoding of the sha256 of the input
pub fn sha256_base32(input: &str) -> String {
    base32_lower(Sha256::digest(input.as_bytes()).as_slice())
}

/// The 8 character hash that's used whenever a domain or label has to be shortened
pub fn short_hash(input: &str) -> String {
    let mut hash = sha256_base32(input);
    hash.truncate(8);
    hash
}

fn base32_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u16 = 0;
    let mut bits = 0;
    for byte in bytes {
        buffer = (buffer << 8) | u16::from(*byte);
        bits += 8;
        while bits >= 5 {
            let idx = (buffer >> (bits - 5)) & 0x1f;
            out.push(BASE32_ALPHABET[idx as usize] as char);
            bits -= 5;
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        let idx = (buffer << (5 - bits)) & 0x1f;
        out.push(BASE32_ALPHABET[idx as usize] as char);
    }
    out
}

/// Lower cases the input and replaces every character outside of `[a-z0-9-]` with a `-`
pub fn make_safe(input: &str) -> String {
    NOT_DNS_SAFE
        .replace_all(&input.to_lowercase(), "-")
        .into_owned()
}

/// Returns the input unchanged if it's no longer than `max_len`. Otherwise returns the first
/// `keep` characters, a `-`, and the given hash.
pub fn truncate_with_hash(input: &str, max_len: usize, keep: usize, hash: &str) -> String {
    if input.len() <= max_len {
        return input.to_owned();
    }
    let prefix: String = input.chars().take(keep).collect();
    format!("{}-{}", prefix, hash)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base32_matches_rfc4648_test_vectors() {
        assert_eq!("", base32_lower(b""));
        assert_eq!("my", base32_lower(b"f"));
        assert_eq!("mzxq", base32_lower(b"fo"));
        assert_eq!("mzxw6", base32_lower(b"foo"));
        assert_eq!("mzxw6yq", base32_lower(b"foob"));
        assert_eq!("mzxw6ytb", base32_lower(b"fooba"));
        assert_eq!("mzxw6ytboi", base32_lower(b"foobar"));
    }

    #[test]
    fn sha256_hex_is_lower_case() {
        assert_eq!(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            sha256_hex("")
        );
    }

    #[test]
    fn short_hash_is_stable_and_eight_chars() {
        let hash = short_hash("example-project-main");
        assert_eq!(8, hash.len());
        assert_eq!(hash, short_hash("example-project-main"));
        assert_ne!(hash, short_hash("example-project-develop"));
        assert!(hash.chars().all(|c| BASE32_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn make_safe_replaces_invalid_characters() {
        assert_eq!("feature-my-branch", make_safe("feature/My_Branch"));
        assert_eq!("a-b-c", make_safe("a.b c"));
    }

    #[test]
    fn long_names_are_truncated_and_hashed() {
        assert_eq!("short", truncate_with_hash("short", 10, 5, "abc"));
        assert_eq!("abcde-xyz", truncate_with_hash("abcdefghijk", 10, 5, "xyz"));
    }
}
