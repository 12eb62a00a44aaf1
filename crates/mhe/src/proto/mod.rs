//! Protobuf definitions for the serialized keys and parameters.

/// Protobuf for the BFV encryption scheme.
pub mod bfv;
