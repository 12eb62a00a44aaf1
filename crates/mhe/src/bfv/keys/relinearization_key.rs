//! Relinearization keys for the BFV encryption scheme.
//!
//! A relinearization key switches from `s^2` to `s`, turning the third
//! element of a product `(c0, c1, c2)` into a pair that decrypts under `s`.

use crate::bfv::{BfvParameters, EvaluationKey, SecretKey};
use crate::proto::bfv::RelinearizationKey as RelinearizationKeyProto;
use crate::{Error, Result};
use fhe_traits::{DeserializeParametrized, FheParametrized, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// A key switching key from `s^2` to `s`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RelinearizationKey {
    pub(crate) ksk: EvaluationKey,
}

impl RelinearizationKey {
    /// Generate a [`RelinearizationKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let s2 = sk.poly_squared_extended()?;
        Ok(Self {
            ksk: EvaluationKey::new(sk, &s2, rng)?,
        })
    }

    /// Wraps a key switching key from `s^2` to `s`.
    pub fn from_evaluation_key(ksk: EvaluationKey) -> Self {
        Self { ksk }
    }

    /// The underlying key switching key.
    pub fn evaluation_key(&self) -> &EvaluationKey {
        &self.ksk
    }
}

impl From<&RelinearizationKey> for RelinearizationKeyProto {
    fn from(value: &RelinearizationKey) -> Self {
        RelinearizationKeyProto {
            ksk: Some((&value.ksk).into()),
        }
    }
}

impl Serialize for RelinearizationKey {
    fn to_bytes(&self) -> Vec<u8> {
        RelinearizationKeyProto::from(self).encode_to_vec()
    }
}

impl FheParametrized for RelinearizationKey {
    type Parameters = BfvParameters;
}

impl DeserializeParametrized for RelinearizationKey {
    type Error = Error;

    fn from_bytes(bytes: &[u8], par: &Arc<Self::Parameters>) -> Result<Self> {
        let proto: RelinearizationKeyProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let ksk = proto.ksk.as_ref().ok_or(Error::SerializationError)?;
        Ok(Self {
            ksk: EvaluationKey::try_from_proto(ksk, par)?,
        })
    }
}
