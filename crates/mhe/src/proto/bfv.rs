#![allow(missing_docs)]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Parameters {
    #[prost(uint32, tag = "1")]
    pub degree: u32,
    #[prost(uint64, repeated, tag = "2")]
    pub moduli: ::prost::alloc::vec::Vec<u64>,
    #[prost(uint64, tag = "3")]
    pub plaintext: u64,
    #[prost(uint32, tag = "4")]
    pub variance: u32,
    #[prost(uint64, repeated, tag = "5")]
    pub special_moduli: ::prost::alloc::vec::Vec<u64>,
    #[prost(uint32, tag = "6")]
    pub decomposition_base: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublicKey {
    /// Ciphertext in the binary codec, with metadata.
    #[prost(bytes = "vec", tag = "1")]
    pub c: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluationKey {
    /// First components, digit-major.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub c0: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    /// Second components, digit-major.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub c1: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(uint32, tag = "3")]
    pub digits: u32,
    #[prost(uint32, tag = "4")]
    pub windows: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RelinearizationKey {
    #[prost(message, optional, tag = "1")]
    pub ksk: ::core::option::Option<EvaluationKey>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GaloisKey {
    #[prost(message, optional, tag = "1")]
    pub ksk: ::core::option::Option<EvaluationKey>,
    #[prost(uint32, tag = "2")]
    pub element: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublicKeyShare {
    #[prost(bytes = "vec", tag = "1")]
    pub p0: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RelinKeyShare {
    /// First components, digit-major.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub h0: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    /// Second components, digit-major.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub h1: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(uint32, tag = "3")]
    pub digits: u32,
    #[prost(uint32, tag = "4")]
    pub windows: u32,
    #[prost(uint32, tag = "5")]
    pub round: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GaloisKeyShare {
    /// Shares, digit-major.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub h: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(uint32, tag = "2")]
    pub digits: u32,
    #[prost(uint32, tag = "3")]
    pub windows: u32,
    #[prost(uint32, tag = "4")]
    pub element: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SecretKeySwitchShare {
    #[prost(bytes = "vec", tag = "1")]
    pub h: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublicKeySwitchShare {
    #[prost(bytes = "vec", tag = "1")]
    pub h0: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub h1: ::prost::alloc::vec::Vec<u8>,
}
