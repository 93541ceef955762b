use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("signature does not match message and key")]
    SignatureVerificationFailed,

    #[error("signature must be 64 bytes, got {0}")]
    InvalidSignatureFormat(usize),

    #[error("public key is not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("merkle path is empty")]
    EmptyPath,

    /// Sibling list and direction list of a Merkle path disagree in length.
    #[error("merkle path has {path} siblings but {index} directions")]
    PathLengthMismatch { path: usize, index: usize },

    #[error("leaf {index} out of range for a tree of {count} leaves")]
    LeafOutOfRange { index: usize, count: usize },
}
