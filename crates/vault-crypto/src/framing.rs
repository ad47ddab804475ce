//! Nonce/ciphertext framing and base64 transport codec (§4.1, §6.3).
//!
//! On-disk and object-storage payloads use raw bytes: `nonce(24) ||
//! ciphertext`. Fields transported inside JSON (the `encrypted_*` record
//! fields of §3.1) base64-encode that same frame with the URL-safe alphabet.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::aead::NONCE_BYTES;
use crate::error::FormatError;

/// `nonce || ciphertext`, for raw byte storage (disk, object store).
pub fn combine(nonce: &[u8; NONCE_BYTES], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(ciphertext);
    out
}

/// Inverse of [`combine`]. Fails if `buf` is shorter than a nonce.
pub fn split(buf: &[u8]) -> Result<([u8; NONCE_BYTES], &[u8]), FormatError> {
    if buf.len() < NONCE_BYTES {
        return Err(FormatError("frame shorter than nonce"));
    }
    let mut nonce = [0u8; NONCE_BYTES];
    nonce.copy_from_slice(&buf[..NONCE_BYTES]);
    Ok((nonce, &buf[NONCE_BYTES..]))
}

/// Base64 (URL-safe, unpadded) encode a `combine`d frame for JSON transport.
pub fn encode_b64(nonce: &[u8; NONCE_BYTES], ciphertext: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(combine(nonce, ciphertext))
}

/// Inverse of [`encode_b64`]: decode then [`split`].
pub fn decode_b64(s: &str) -> Result<([u8; NONCE_BYTES], Vec<u8>), FormatError> {
    let raw = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| FormatError("invalid base64"))?;
    let (nonce, ct) = split(&raw)?;
    Ok((nonce, ct.to_vec()))
}
