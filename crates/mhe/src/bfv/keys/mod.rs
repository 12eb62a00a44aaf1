mod evaluation_key;
mod galois_key;
mod key_set;
mod public_key;
mod relinearization_key;
mod secret_key;

pub use evaluation_key::EvaluationKey;
pub(crate) use galois_key::check_galois_element;
pub use galois_key::GaloisKey;
pub use key_set::EvaluationKeySet;
pub use public_key::PublicKey;
pub use relinearization_key::RelinearizationKey;
pub use secret_key::SecretKey;
