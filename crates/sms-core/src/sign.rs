//! Hash related utils shared by the vendor request signers.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use md5::Md5;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::RngCore;
use sha1::Sha1;
use sha2::Digest;
use sha2::Sha256;

/// RFC 3986 unreserved characters stay as-is, everything else is percent-encoded.
pub static RFC3986_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Base64 encode
pub fn base64_encode(content: &[u8]) -> String {
    BASE64_STANDARD.encode(content)
}

/// Hex encoded MD5 hash.
pub fn hex_md5(content: &[u8]) -> String {
    hex::encode(Md5::digest(content).as_slice())
}

/// Hex encoded SHA1 hash.
pub fn hex_sha1(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content).as_slice())
}

/// Hex encoded SHA256 hash.
///
/// Use this function instead of `hex::encode(sha256(content))` can reduce
/// extra copy.
pub fn hex_sha256(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content).as_slice())
}

/// Base64 encoded SHA256 hash.
pub fn base64_sha256(content: &[u8]) -> String {
    base64_encode(Sha256::digest(content).as_slice())
}

/// HMAC with SHA256 hash.
pub fn hmac_sha256(key: &[u8], content: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut h = Hmac::<Sha256>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    h.update(content);

    h.finalize().into_bytes().to_vec()
}

/// Hex encoded HMAC with SHA256 hash.
pub fn hex_hmac_sha256(key: &[u8], content: &[u8]) -> String {
    hex::encode(hmac_sha256(key, content))
}

/// Base64 encoded HMAC with SHA1 hash.
pub fn base64_hmac_sha1(key: &[u8], content: &[u8]) -> String {
    let mut h = Hmac::<Sha1>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    h.update(content);

    base64_encode(&h.finalize().into_bytes())
}

/// Percent-encode with the RFC 3986 unreserved set (space becomes `%20`, `~` is kept).
pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, &RFC3986_ENCODE_SET).to_string()
}

/// `len` random bytes, hex encoded.
pub fn nonce(len: usize) -> String {
    hex::encode(random_bytes(len))
}

/// `len` random bytes from the thread-local CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
