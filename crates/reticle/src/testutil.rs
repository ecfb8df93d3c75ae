//! Synthetic data stores for unit tests.

use tempfile::TempDir;

use crate::data::DataStore;
use crate::lattice::Lattice;
use crate::zeros::ZeroType;

const SEQ_MAX: u64 = 500;

const ZETA: [f64; 20] = [
    14.134725141734693,
    21.022039638771555,
    25.010857580145688,
    30.424876125859513,
    32.935061587739189,
    37.586178158825671,
    40.918719012147495,
    43.327073280914999,
    48.005150881167159,
    49.773832477672302,
    52.970321477714460,
    56.446247697063394,
    59.347044002602353,
    60.831778524609809,
    65.112544048081606,
    67.079810529494173,
    69.546401711173979,
    72.067157674481907,
    75.704690699083933,
    77.144840068874805,
];

fn is_prime(n: u64) -> bool {
    n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

pub(crate) fn primes_upto(max: u64) -> Vec<f64> {
    (2..=max).filter(|&n| is_prime(n)).map(|n| n as f64).collect()
}

fn sixn_upto(max: u64) -> Vec<u64> {
    (1..).map(|n| 6 * n - 1).take_while(|&v| v <= max).filter(|&v| !is_prime(v)).collect()
}

pub(crate) fn sequence(zt: ZeroType) -> Vec<f64> {
    let as_f64 = |v: Vec<u64>| v.into_iter().map(|n| n as f64).collect::<Vec<_>>();
    let two_pi = 2.0 * std::f64::consts::PI;
    match zt {
        ZeroType::Primes => primes_upto(SEQ_MAX),
        ZeroType::SixN => as_f64(sixn_upto(SEQ_MAX)),
        ZeroType::SixNFives => as_f64(sixn_upto(SEQ_MAX).into_iter().filter(|v| v % 5 != 0).collect()),
        ZeroType::Zeta => ZETA.to_vec(),
        ZeroType::ZetaNorm1 => ZETA.iter().map(|z| z * z.ln() / two_pi).collect(),
        ZeroType::ZetaNorm2 => ZETA.iter().map(|z| z * (z / two_pi).ln() / two_pi).collect(),
        ZeroType::Comp1 => as_f64((4..=SEQ_MAX).filter(|&n| !is_prime(n)).collect()),
        ZeroType::Comp2 => {
            let sixn = sixn_upto(SEQ_MAX);
            as_f64((4..=SEQ_MAX).filter(|n| !is_prime(*n) && !sixn.contains(n)).collect())
        }
    }
}

/// Temp store with every sequence and a unit-spaced Grid/Vertices lattice
/// covering `[-120, 120]²`.
pub(crate) fn synthetic_store() -> (TempDir, DataStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DataStore::new(dir.path());
    for zt in ZeroType::ALL {
        store.write_zeros(zt, &sequence(zt)).expect("write zeros");
    }
    Lattice::grid(120.0, 1.0).save(&store).expect("write lattice");
    (dir, store)
}
