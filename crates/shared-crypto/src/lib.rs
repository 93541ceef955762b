//! # Shared Crypto - Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256 | Content hashes, addresses, digests |
//! | `signatures` | Ed25519 | Transaction and oracle report signatures |
//! | `merkle` | SHA-256 binary tree | Block roots, cross-chain inclusion proofs |
//!
//! Every hash in the ledger is SHA-256 so that a foreign chain can verify
//! our proofs (and we theirs) without agreeing on anything else.

#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod merkle;
pub mod signatures;

pub use errors::CryptoError;
pub use hashing::{hash_leaf, hash_pair, sha256, sha256_many, CanonicalHasher, Hash, ZERO_HASH};
pub use merkle::{compute_root, MerklePath, MerkleTree, NodeSide};
pub use signatures::{verify_signature, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
