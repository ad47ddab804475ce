//! Password-based key derivation (§4.1).
//!
//! `encryption_version = "1.0"` pins the Argon2id parameters below. Bumping
//! the parameters REQUIRES bumping the version string; `derive_kek` dispatches
//! on it so that old ciphertexts (and the master keys wrapped under their
//! KEK) remain derivable after a parameter change ships.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::CryptoError;

/// Parameters for `encryption_version = "1.0"`: OWASP's interactive Argon2id
/// profile (19 MiB memory, 2 iterations, 1 degree of parallelism).
const V1_0_MEM_COST_KIB: u32 = 19_456;
const V1_0_TIME_COST: u32 = 2;
const V1_0_PARALLELISM: u32 = 1;

pub const KEK_LEN: usize = 32;

/// Derive a 32-byte Key Encryption Key from a password and salt.
///
/// `salt` should be the user's `password_salt` (§3.1), at least 16 random
/// bytes. `encryption_version` selects the parameter set; unknown versions
/// are rejected rather than silently falling back to a default, since a
/// silent fallback would let an attacker downgrade the KDF cost.
pub fn derive_kek(
    password: &[u8],
    salt: &[u8],
    encryption_version: &str,
) -> Result<[u8; KEK_LEN], CryptoError> {
    let params = params_for_version(encryption_version)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; KEK_LEN];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|_| CryptoError::Format("argon2 parameters rejected"))?;
    Ok(out)
}

fn params_for_version(encryption_version: &str) -> Result<Params, CryptoError> {
    match encryption_version {
        "1.0" => Params::new(V1_0_MEM_COST_KIB, V1_0_TIME_COST, V1_0_PARALLELISM, Some(KEK_LEN))
            .map_err(|_| CryptoError::Format("invalid argon2 params for version 1.0")),
        _ => Err(CryptoError::Format("unsupported encryption_version")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let salt = [7u8; 16];
        let a = derive_kek(b"hunter2", &salt, "1.0").unwrap();
        let b = derive_kek(b"hunter2", &salt, "1.0").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_passwords_diverge() {
        let salt = [7u8; 16];
        let a = derive_kek(b"hunter2", &salt, "1.0").unwrap();
        let b = derive_kek(b"hunter3", &salt, "1.0").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_version_rejected() {
        let salt = [7u8; 16];
        assert!(derive_kek(b"x", &salt, "9.9").is_err());
    }
}
