//! OTRv4 cryptographic primitives
//!
//! Everything the handshake and SMP layers need, behind a narrow interface:
//!
//! - **Ed448**: point/scalar arithmetic, RFC 8032 encodings, subgroup checks
//! - **Keys**: Ed448 key pairs for identity, ephemeral ECDH and prekeys; EdDSA
//! - **DH3072**: RFC 3526 group 15 key pairs, MPI encoding, subgroup checks
//! - **KDF**: SHAKE-256 with a one-byte usage domain separator
//! - **Ring signatures**: deniable proofs over three Ed448 keys
//! - **Secrets**: zeroizing buffers and constant-time comparison

pub mod dh;
pub mod ed448;
pub mod error;
pub mod fingerprint;
pub mod kdf;
pub mod keys;
pub mod ring_sig;
pub mod secret;

pub use dh::{DhKeyPair, DhPublicKey};
pub use ed448::{POINT_BYTES, Point, SCALAR_BYTES, Scalar};
pub use error::CryptoError;
pub use fingerprint::{Fingerprint, fingerprint_of, format_fingerprint, verify_fingerprint};
pub use kdf::{HASH_BYTES, Kdf, kdf, kdf_secret, usage};
pub use keys::{KeyPair, SIGNATURE_BYTES, verify_signature};
pub use ring_sig::{RING_SIGNATURE_BYTES, RingSignature};
pub use secret::{SecretBytes, constant_time_eq};
