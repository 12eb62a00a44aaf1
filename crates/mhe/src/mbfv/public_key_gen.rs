use std::sync::Arc;

use crate::bfv::{BfvParameters, Ciphertext, PublicKey, SecretKey};
use crate::proto::bfv::PublicKeyShare as PublicKeyShareProto;
use crate::{Error, Result};
use fhe_math::rq::{Poly, Representation};
use fhe_traits::{DeserializeWithContext, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use super::{Aggregate, CommonRandomPoly, ShareAccumulator};

/// A party's share in public key generation protocol.
///
/// Each party uses the `PublicKeyShare` to generate their share of the public
/// key and participate in the "Protocol 1: EncKeyGen", as detailed in
/// [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf) (p6). Use the
/// [`Aggregate`] impl to combine the shares into a [`PublicKey`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublicKeyShare {
    pub(crate) par: Arc<BfvParameters>,
    pub(crate) crp: CommonRandomPoly,
    pub(crate) p0_share: Poly,
}

impl PublicKeyShare {
    /// Participate in a new EncKeyGen protocol.
    ///
    /// 1. *Private input*: BFV secret key share
    /// 2. *Public input*: common random polynomial, at the maximum level
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.parameters().clone();
        let ctx = crp.poly.ctx().clone();
        par.level_of_ctx(&ctx)?;

        let s = sk_share.poly_in(&ctx)?;
        let e = Zeroizing::new(Poly::small(&ctx, Representation::Ntt, par.variance, rng)?);

        let mut p0_share = -crp.poly.clone();
        p0_share.disallow_variable_time_computations();
        p0_share *= s.as_ref();
        p0_share += e.as_ref();
        unsafe { p0_share.allow_variable_time_computations() }

        Ok(Self { par, crp, p0_share })
    }

    /// A zero share for the session of `crp`.
    pub fn allocate(par: &Arc<BfvParameters>, crp: CommonRandomPoly) -> Result<Self> {
        par.level_of_ctx(crp.poly.ctx())?;
        let p0_share = Poly::zero(crp.poly.ctx(), Representation::Ntt);
        Ok(Self {
            par: par.clone(),
            crp,
            p0_share,
        })
    }

    /// The level of the share.
    pub fn level(&self) -> Result<usize> {
        self.par.level_of_ctx(self.p0_share.ctx())
    }

    /// Deserialize a PublicKeyShare from bytes with the given parameters and
    /// CRP.
    pub fn deserialize(
        bytes: &[u8],
        par: &Arc<BfvParameters>,
        crp: CommonRandomPoly,
    ) -> Result<Self> {
        let proto: PublicKeyShareProto =
            Message::decode(bytes).map_err(|_| Error::SerializationError)?;
        let p0_share = Poly::from_bytes(&proto.p0, crp.poly.ctx())?;
        Ok(Self {
            par: par.clone(),
            crp,
            p0_share,
        })
    }
}

impl ShareAccumulator for PublicKeyShare {
    fn aggregate_share(&mut self, share: &Self) -> Result<()> {
        if self.par != share.par {
            return Err(Error::Aggregation("incompatible parameters".to_string()));
        }
        if self.p0_share.ctx() != share.p0_share.ctx() {
            return Err(Error::share_level_mismatch(self.level()?, share.level()?));
        }
        if self.crp != share.crp {
            return Err(Error::Aggregation(
                "share was generated with another common random polynomial".to_string(),
            ));
        }
        self.p0_share += &share.p0_share;
        Ok(())
    }
}

impl Aggregate<PublicKeyShare> for PublicKey {
    #[instrument(skip_all)]
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = PublicKeyShare>,
    {
        let mut shares = iter.into_iter();
        let mut acc = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut count = 1usize;
        for sh in shares {
            acc.aggregate_share(&sh)?;
            count += 1;
        }
        debug!(shares = count, "aggregated public key shares");

        let c = Ciphertext::new(vec![acc.p0_share, acc.crp.poly], &acc.par)?;
        PublicKey::from_ciphertext(c)
    }
}

impl Serialize for PublicKeyShare {
    fn to_bytes(&self) -> Vec<u8> {
        PublicKeyShareProto {
            p0: self.p0_share.to_bytes(),
        }
        .encode_to_vec()
    }
}
