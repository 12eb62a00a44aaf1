//! The set of evaluation keys available to an evaluator.

use crate::bfv::{GaloisKey, PublicKey, RelinearizationKey};
use std::collections::BTreeMap;

/// Keys an [`Evaluator`](crate::bfv::Evaluator) may use. Each kind of key has
/// its own slot, so the capabilities of a set are known from its contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationKeySet {
    relinearization_key: Option<RelinearizationKey>,
    public_key: Option<PublicKey>,
    galois_keys: BTreeMap<usize, GaloisKey>,
}

impl EvaluationKeySet {
    /// An empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relinearization key.
    pub fn with_relinearization_key(mut self, rk: RelinearizationKey) -> Self {
        self.relinearization_key = Some(rk);
        self
    }

    /// Sets the public key.
    pub fn with_public_key(mut self, pk: PublicKey) -> Self {
        self.public_key = Some(pk);
        self
    }

    /// Adds a Galois key, replacing any key for the same element.
    pub fn with_galois_key(mut self, gk: GaloisKey) -> Self {
        self.insert_galois_key(gk);
        self
    }

    /// Adds a Galois key, returning the key previously stored for the same
    /// element.
    pub fn insert_galois_key(&mut self, gk: GaloisKey) -> Option<GaloisKey> {
        self.galois_keys.insert(gk.element(), gk)
    }

    /// Whether the set holds a relinearization key.
    pub fn has_relinearization_key(&self) -> bool {
        self.relinearization_key.is_some()
    }

    /// Whether the set holds a public key.
    pub fn has_public_key(&self) -> bool {
        self.public_key.is_some()
    }

    /// Whether the set holds a Galois key for `element`.
    pub fn has_galois_key(&self, element: usize) -> bool {
        self.galois_keys.contains_key(&element)
    }

    /// The Galois elements of the keys in the set, in increasing order.
    pub fn galois_elements(&self) -> Vec<usize> {
        self.galois_keys.keys().copied().collect()
    }

    /// The relinearization key, if any.
    pub fn relinearization_key(&self) -> Option<&RelinearizationKey> {
        self.relinearization_key.as_ref()
    }

    /// The public key, if any.
    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    /// The Galois key for `element`, if any.
    pub fn galois_key(&self, element: usize) -> Option<&GaloisKey> {
        self.galois_keys.get(&element)
    }
}
