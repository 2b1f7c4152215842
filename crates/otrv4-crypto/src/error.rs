//! Crypto error types.

/// Errors from cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid length for {what}: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid point encoding: {0}")]
    InvalidPoint(&'static str),

    #[error("Point is not in the prime-order subgroup")]
    PointNotInSubgroup,

    #[error("Scalar is not canonical (>= group order)")]
    NonCanonicalScalar,

    #[error("DH value is outside the prime-order subgroup")]
    InvalidDhValue,

    #[error("DH value does not fit the group modulus")]
    DhValueTooLarge,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Ring signature verification failed")]
    BadRingSignature,

    #[error("Signing key is not a member of the ring")]
    SignerNotInRing,

    #[error("Shared secret is the identity element")]
    DegenerateSharedSecret,
}
