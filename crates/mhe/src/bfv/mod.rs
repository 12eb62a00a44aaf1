//! The Brakerski-Fan-Vercauteren homomorphic encryption scheme, with key
//! switching over an auxiliary modulus.

mod ciphertext;
mod encoding;
mod evaluator;
mod keys;
mod parameters;
mod plaintext;

pub use ciphertext::{Ciphertext, METADATA_SIZE};
pub use encoding::Encoding;
pub use evaluator::{Evaluator, Operand};
pub(crate) use keys::check_galois_element;
pub use keys::{
    EvaluationKey, EvaluationKeySet, GaloisKey, PublicKey, RelinearizationKey, SecretKey,
};
pub use parameters::{BfvParameters, BfvParametersBuilder};
pub use plaintext::Plaintext;
