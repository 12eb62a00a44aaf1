//! The Multiparty BFV scheme, as described by Christian Mouchet et. al. in
//! [Multiparty Homomorphic Encryption from Ring-Learning-with-Errors](https://eprint.iacr.org/2020/304.pdf).
//!
//! Every protocol follows the same shape: each party computes a share from
//! its secret key, public common randomness and local randomness; the shares
//! are then summed, in any order, into the protocol output.

mod crp;
mod galois_key_gen;
mod public_key_gen;
mod public_key_switch;
mod relin_key_gen;
mod secret_key_switch;
mod smudging;

pub use crp::{CommonRandomPoly, EvaluationKeyCrp, GaloisKeyCrp, RelinKeyCrp};
pub use galois_key_gen::GaloisKeyShare;
pub use public_key_gen::PublicKeyShare;
pub use public_key_switch::PublicKeySwitchShare;
pub use relin_key_gen::{
    KeyGenRound, RelinKeyGenerator, RelinKeyRound2Share, RelinKeyShare, Round1, Round2,
};
pub use secret_key_switch::{DecryptionShare, SecretKeySwitchShare};
pub use smudging::SmudgingConfig;

use crate::{Error, Result};

/// Aggregate shares in an MPC protocol.
pub trait Aggregate<S>: Sized {
    /// Create a new aggregated value from shares.
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = S>;

    /// Create a new aggregated value from the shares of exactly `parties`
    /// parties. A missing share fails with [`Error::TooFewValues`] and an
    /// extra one with [`Error::TooManyValues`].
    fn from_shares_expected<T>(parties: usize, iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = S>,
    {
        let shares = iter.into_iter().collect::<Vec<_>>();
        if shares.len() < parties {
            return Err(Error::insufficient_shares(shares.len(), parties));
        }
        if shares.len() > parties {
            return Err(Error::too_many_shares(shares.len(), parties));
        }
        Self::from_shares(shares)
    }
}

/// Shares that can be summed into an accumulator, one at a time.
pub trait ShareAccumulator: Sized {
    /// Adds `share` into `self`. Fails with [`Error::Aggregation`] when the
    /// share does not belong to the same session, level or shape.
    fn aggregate_share(&mut self, share: &Self) -> Result<()>;
}

impl<S: ShareAccumulator> Aggregate<S> for S {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = S>,
    {
        let mut shares = iter.into_iter();
        let mut acc = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        for share in shares {
            acc.aggregate_share(&share)?;
        }
        Ok(acc)
    }
}

/// Aggregates the shares of an iterator.
pub trait AggregateIter<S>: Iterator<Item = S> + Sized {
    /// Aggregates all the shares into `A`.
    fn aggregate<A: Aggregate<S>>(self) -> Result<A> {
        A::from_shares(self)
    }

    /// Aggregates the shares of exactly `parties` parties into `A`.
    fn aggregate_expected<A: Aggregate<S>>(self, parties: usize) -> Result<A> {
        A::from_shares_expected(parties, self)
    }
}

impl<S, I: Iterator<Item = S>> AggregateIter<S> for I {}
