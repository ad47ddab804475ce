//! Key Hierarchy Service (§4.2).
//!
//! `password -> KEK -> master_key -> collection_key -> file_key`. Every
//! intermediate is a [`Secret32`] zeroized on drop; nothing in this module
//! ever clones a recovered key.

use vault_crypto::{aead_decrypt, derive_kek, Secret32};

use crate::error::KeyError;
use crate::types::{CollectionKeyMaterial, EncryptedKey, UserKeyMaterial};

fn to_secret32(bytes: Vec<u8>) -> Result<Secret32, KeyError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| KeyError::Malformed("decrypted key is not 32 bytes"))?;
    Ok(Secret32::new(arr))
}

/// Try every `(ciphertext, nonce)` candidate on `wrapped`, current version
/// first then `previous_keys` descending, returning the first that opens
/// under `wrapping_key`. Mirrors §4.2's required fallback for rotated keys.
fn open_with_history(wrapped: &EncryptedKey, wrapping_key: &[u8; 32]) -> Result<Secret32, KeyError> {
    let mut last_err = KeyError::NoMatchingKeyVersion;
    for (_, ciphertext, nonce) in wrapped.candidates() {
        match aead_decrypt(ciphertext, nonce, wrapping_key) {
            Ok(plaintext) => return to_secret32(plaintext),
            Err(_) => {
                last_err = KeyError::NoMatchingKeyVersion;
            }
        }
    }
    Err(last_err)
}

/// `decrypt_collection_key_chain` (§4.2):
///
/// 1. `kek = derive_kek(password, user.password_salt)`
/// 2. `master_key = aead_decrypt(user.encrypted_master_key, kek)`
/// 3. `collection_key = aead_decrypt(collection.encrypted_collection_key, master_key)`
///
/// Step 2's failure is reported as [`KeyError::IncorrectPassword`] — the
/// spec requires this not be distinguishable from "user does not exist".
pub fn decrypt_collection_key_chain(
    user: &UserKeyMaterial,
    collection: &CollectionKeyMaterial,
    password: &[u8],
) -> Result<Secret32, KeyError> {
    let kek = derive_kek(password, &user.password_salt, &user.encryption_version)
        .map_err(KeyError::from)?;
    let kek = Secret32::new(kek);

    let master_key = kek
        .with_exposed(|kek_bytes| open_with_history(&user.encrypted_master_key, kek_bytes))
        .map_err(|_| KeyError::IncorrectPassword)?;

    let collection_key = master_key.with_exposed(|master_key_bytes| {
        open_with_history(&collection.encrypted_collection_key, master_key_bytes)
    })?;

    Ok(collection_key)
    // `kek` and `master_key` go out of scope here and are zeroized on drop.
}

/// `decrypt_file_key` (§4.2): unwrap a file's key under its collection key,
/// trying `previous_keys` in descending order if the current version fails.
pub fn decrypt_file_key(file_key: &EncryptedKey, collection_key: &Secret32) -> Result<Secret32, KeyError> {
    collection_key.with_exposed(|ck_bytes| open_with_history(file_key, ck_bytes))
}
