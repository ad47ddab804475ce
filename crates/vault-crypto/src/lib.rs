//! # vault-crypto
//!
//! Thin, auditable cryptographic primitives layer for CryptVault (spec §4.1):
//! Argon2id password KDF, XChaCha20-Poly1305 AEAD, zeroizing secret buffers,
//! random byte generation, and nonce/ciphertext framing.
//!
//! Nothing above this crate should reach for a cipher or RNG directly —
//! every other crate in the workspace goes through here.

mod aead;
mod error;
mod framing;
mod kdf;
mod random;
mod secret;

pub use aead::{aead_decrypt, aead_encrypt, Sealed, KEY_BYTES, NONCE_BYTES, TAG_BYTES};
pub use error::{AuthError, CryptoError, FormatError};
pub use framing::{combine, decode_b64, encode_b64, split};
pub use kdf::{derive_kek, KEK_LEN};
pub use random::{fill_random, random_bytes};
pub use secret::{Secret, Secret32};

/// Current encryption-suite identifier (`encryption_version`, §3.1). Bumping
/// the KDF or AEAD parameters requires a new string here plus a matching
/// arm in [`kdf::derive_kek`]'s internal dispatch.
pub const ENCRYPTION_VERSION: &str = "1.0";
