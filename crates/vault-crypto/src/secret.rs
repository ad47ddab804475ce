//! Zeroizing secret buffer (§4.1 `zeroize`, §4.2 ownership rules, §5 shared
//! secrets).
//!
//! A [`Secret`] owns exactly one copy of key material. It does not implement
//! `Clone` or `Copy`: passing a secret across a task boundary is an explicit
//! move, never an implicit copy. Dropping a `Secret` overwrites its bytes
//! before the memory is freed.

use zeroize::ZeroizeOnDrop;

/// An `N`-byte secret, zeroized on drop. Used for KEKs, the Master Key,
/// Collection Keys, and File Keys (all 32 bytes in this spec, but the type
/// is generic so callers cannot accidentally widen/narrow a key in transit).
#[derive(ZeroizeOnDrop)]
pub struct Secret<const N: usize>([u8; N]);

impl<const N: usize> Secret<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Borrow the underlying bytes. Callers must not copy them into a
    /// longer-lived, non-zeroizing structure.
    pub fn expose(&self) -> &[u8; N] {
        &self.0
    }

    /// Consume the secret, handing its bytes to `f`, then zeroize the
    /// original in place. Useful when an API (e.g. an AEAD call) needs a
    /// plain `&[u8; N]` and the caller wants to guarantee no extra copy of
    /// `self` survives past this call.
    pub fn with_exposed<R>(&self, f: impl FnOnce(&[u8; N]) -> R) -> R {
        f(&self.0)
    }
}

impl<const N: usize> std::fmt::Debug for Secret<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret<{}>(REDACTED)", N)
    }
}

pub type Secret32 = Secret<32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_bytes() {
        let s = Secret32::new([0x42; 32]);
        let rendered = format!("{:?}", s);
        assert!(!rendered.contains("42"));
    }

    #[test]
    fn expose_returns_original_bytes() {
        let s = Secret32::new([7u8; 32]);
        assert_eq!(s.expose(), &[7u8; 32]);
    }
}
