use std::sync::{Arc, OnceLock};

use fhe_traits::{DeserializeParametrized, Serialize};
use mhe::bfv::{BfvParameters, BfvParametersBuilder, Ciphertext, Encoding, Plaintext, SecretKey};
use mhe::Error;
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn parameters() -> &'static Arc<BfvParameters> {
    static PAR: OnceLock<Arc<BfvParameters>> = OnceLock::new();
    PAR.get_or_init(|| {
        BfvParametersBuilder::new()
            .set_degree(16)
            .set_plaintext_modulus(1153)
            .set_moduli_sizes(&[62, 62, 62])
            .set_special_moduli_sizes(&[62])
            .build_arc()
            .unwrap()
    })
}

/// A ciphertext of degree `degree` at `level`, derived from `seed`.
fn ciphertext(seed: u64, degree: usize, level: usize, scale: f64) -> Ciphertext {
    let par = parameters();
    let mut rng = StdRng::seed_from_u64(seed);
    let sk = SecretKey::random(par, &mut rng);
    let v = (0..par.degree())
        .map(|_| rng.gen_range(0..par.plaintext()))
        .collect::<Vec<_>>();
    let pt = Plaintext::try_encode(&v, Encoding::poly_at_level(level), par).unwrap();
    let mut ct = sk.try_encrypt(&pt, &mut rng).unwrap();
    while ct.degree() < degree {
        let extra = ct.c[1].clone();
        ct.c.push(extra);
    }
    ct.set_scale(scale);
    ct
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn roundtrip(seed: u64, degree in 1usize..=2, level in 0usize..=2, scale in -1e6f64..1e6) {
        let par = parameters();
        let ct = ciphertext(seed, degree, level, scale);
        let bytes = ct.to_bytes();
        prop_assert_eq!(bytes.len(), ct.binary_len(true));
        prop_assert_eq!(bytes[0] as usize, degree + 1);
        prop_assert_eq!(bytes[9], 0);
        prop_assert_eq!(bytes[10], 1);

        let decoded = Ciphertext::from_bytes(&bytes, par).unwrap();
        prop_assert_eq!(decoded.level, level);
        prop_assert_eq!(decoded.scale().to_bits(), scale.to_bits());
        prop_assert_eq!(&decoded, &ct);

        let raw = ct.to_bytes_with_metadata(false);
        prop_assert_eq!(raw.len(), ct.binary_len(false));
        let decoded = Ciphertext::from_bytes_without_metadata(&raw, par).unwrap();
        prop_assert_eq!(decoded.c.len(), ct.c.len());
        prop_assert_eq!(decoded.level, level);
    }

    #[test]
    fn truncated_buffers_fail(seed: u64, degree in 1usize..=2, cut in 1usize..64) {
        let par = parameters();
        let bytes = ciphertext(seed, degree, 2, 1.0).to_bytes();
        let cut = cut.min(bytes.len());
        let result = Ciphertext::from_bytes(&bytes[..bytes.len() - cut], par);
        prop_assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn trailing_bytes_fail(seed: u64, extra in proptest::collection::vec(any::<u8>(), 1..32)) {
        let par = parameters();
        let mut bytes = ciphertext(seed, 1, 1, 1.0).to_bytes();
        bytes.extend_from_slice(&extra);
        prop_assert!(matches!(Ciphertext::from_bytes(&bytes, par), Err(Error::Format(_))));
    }

    #[test]
    fn short_headers_fail(bytes in proptest::collection::vec(any::<u8>(), 0..11)) {
        prop_assert!(matches!(
            Ciphertext::from_bytes(&bytes, parameters()),
            Err(Error::Format(_))
        ));
    }
}
