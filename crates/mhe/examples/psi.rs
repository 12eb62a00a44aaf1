// Private set intersection between parties holding subsets of a public
// universe, encoded as 0/1 indicator vectors.
//
// The parties generate a collective public key and relinearization key,
// encrypt their sets, multiply the encryptions in a product tree, and switch
// the result to a receiver's public key so that only the receiver learns the
// intersection.
//
// Set `RUST_LOG=mhe=info` to see the product tree levels.

use std::{env, error::Error, process::exit, sync::Arc, time::Instant};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mhe::bfv::{
    BfvParametersBuilder, Ciphertext, Encoding, EvaluationKeySet, Evaluator, Plaintext,
    PublicKey, RelinearizationKey, SecretKey,
};
use mhe::mbfv::{
    AggregateIter, CommonRandomPoly, PublicKeyShare, PublicKeySwitchShare, RelinKeyCrp,
    RelinKeyGenerator, RelinKeyShare, Round1, SmudgingConfig,
};
use mhe::orchestrator::{EvaluationTree, OrchestratorConfig};
use rand::{rngs::OsRng, Rng};
use tracing_subscriber::EnvFilter;

macro_rules! timeit {
    ($name:expr, $code:expr) => {{
        let start = Instant::now();
        let r = $code;
        println!(
            "{} {}: {:?}",
            style("  ⏱").blue(),
            $name,
            start.elapsed()
        );
        r
    }};
}

fn print_notice_and_exit(error: Option<String>) -> ! {
    println!(
        "{} Private set intersection under a collective key",
        style("  overview:").magenta().bold()
    );
    println!(
        "{} psi [-h] [--help] [<parties>] [<degree>]",
        style("     usage:").magenta().bold()
    );
    println!(
        "{} {} must be at least 1, and {} a power of two between 1024 and 32768",
        style("constraints:").magenta().bold(),
        style("parties").blue(),
        style("degree").blue(),
    );
    if let Some(error) = error {
        println!("{} {}", style("     error:").red().bold(), error);
    }
    exit(0);
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") || args.len() > 2 {
        print_notice_and_exit(None)
    }
    let mut positional = args.iter().map(|a| a.parse::<usize>());
    let parties = match positional.next() {
        Some(Ok(p)) if p >= 1 => p,
        Some(_) => print_notice_and_exit(Some("Invalid `parties` argument".to_string())),
        None => 4,
    };
    let degree = match positional.next() {
        Some(Ok(d)) if d.is_power_of_two() && (1024..=32768).contains(&d) => d,
        Some(_) => print_notice_and_exit(Some("Invalid `degree` argument".to_string())),
        None => 2048,
    };

    // One multiplicative level per tree level, plus headroom.
    let depth = parties.next_power_of_two().trailing_zeros() as usize;
    let moduli_sizes = vec![60; depth + 2];

    println!("# Private set intersection");
    println!("\tparties = {parties}");
    println!("\tdegree = {degree}");
    println!("\tmoduli_sizes = {moduli_sizes:?}");

    let mut rng = OsRng;
    let par = timeit!(
        "Parameters generation",
        BfvParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(65537)
            .set_moduli_sizes(&moduli_sizes)
            .set_special_moduli_sizes(&[60])
            .build_arc()?
    );

    // Setup.
    println!("\n## Key generation");
    let sk_shares = (0..parties)
        .map(|_| SecretKey::random(&par, &mut rng))
        .collect::<Vec<_>>();
    let pk: PublicKey = timeit!("Collective public key", {
        let crp = CommonRandomPoly::new(&par, &mut rng)?;
        sk_shares
            .iter()
            .map(|sk| PublicKeyShare::new(sk, crp.clone(), &mut rng))
            .collect::<mhe::Result<Vec<_>>>()?
            .into_iter()
            .aggregate_expected(parties)?
    });
    let rk: RelinearizationKey = timeit!("Collective relinearization key", {
        let crp = RelinKeyCrp::new(&par, &mut rng)?;
        let generators = sk_shares
            .iter()
            .map(|sk| RelinKeyGenerator::new(sk, &mut rng))
            .collect::<mhe::Result<Vec<_>>>()?;
        let r1: RelinKeyShare<Round1> = generators
            .iter()
            .map(|g| g.round_1(&crp, &mut rng))
            .collect::<mhe::Result<Vec<_>>>()?
            .into_iter()
            .aggregate()?;
        let r1 = Arc::new(r1);
        generators
            .iter()
            .map(|g| g.round_2(&r1, &mut rng))
            .collect::<mhe::Result<Vec<_>>>()?
            .into_iter()
            .aggregate()?
    });

    // Each party holds a random subset of the universe `0..degree`.
    println!("\n## Set encryption");
    let sets = (0..parties)
        .map(|_| {
            (0..degree)
                .map(|_| rng.gen_bool(0.9) as u64)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let progress = ProgressBar::new(parties as u64).with_style(
        ProgressStyle::with_template("\t{bar:40} {pos}/{len} sets")?,
    );
    let inputs = timeit!("Encryption", {
        let mut inputs = Vec::with_capacity(parties);
        for set in &sets {
            let pt = Plaintext::try_encode(set, Encoding::simd(), &par)?;
            inputs.push(pk.try_encrypt(&pt, &mut rng)?);
            progress.inc(1);
        }
        progress.finish_and_clear();
        inputs
    });

    println!("\n## Intersection");
    let ev = Evaluator::new(&par, EvaluationKeySet::new().with_relinearization_key(rk))?;
    let tree = EvaluationTree::new(OrchestratorConfig::default())?;
    let (product, report) = timeit!("Product tree", tree.reduce(&ev, inputs)?);
    for level in &report.levels {
        println!(
            "\tlevel {}: {} products in {:?}",
            level.depth, level.tasks, level.elapsed
        );
    }

    println!("\n## Re-encryption for the receiver");
    let sk_out = SecretKey::random(&par, &mut rng);
    let pk_out = PublicKey::new(&sk_out, &mut rng)?;
    let product = Arc::new(product);
    let smudging = SmudgingConfig::default();
    let switched: Ciphertext = timeit!("Public key switch", {
        sk_shares
            .iter()
            .map(|sk| PublicKeySwitchShare::new(sk, &pk_out, product.clone(), &smudging, &mut rng))
            .collect::<mhe::Result<Vec<_>>>()?
            .into_iter()
            .aggregate_expected(parties)?
    });

    let intersection = timeit!(
        "Decryption",
        sk_out.try_decrypt(&switched)?.try_decode(Encoding::simd())?
    );
    let expected = (0..degree)
        .map(|i| sets.iter().map(|set| set[i]).product::<u64>())
        .collect::<Vec<_>>();
    if intersection != expected {
        println!("{} the intersection is incorrect", style("     error:").red().bold());
        exit(1);
    }
    println!(
        "\n{} {} elements in the intersection",
        style("    result:").green().bold(),
        intersection.iter().sum::<u64>()
    );
    Ok(())
}
