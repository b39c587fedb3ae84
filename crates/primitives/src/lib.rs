//! Core data types for the staychain attestation service: commitments,
//! attestations and the script/key derivation helpers that bind an
//! attestation output to the commitment it attests.
pub mod attestation;
pub mod commitment;
pub mod scripts;
