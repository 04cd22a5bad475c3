#[macro_use]
extern crate criterion;
use criterion::Criterion;
use wheel_sieve::{PreSieve, SmallSieve};

fn sieving_primes(low: u64, high: u64) -> Vec<u64> {
    (low..=high)
        .filter(|&n| n % 2 != 0 && (3..n).take_while(|d| d * d <= n).all(|d| n % d != 0))
        .collect()
}

pub fn bench_cross_off(c: &mut Criterion) {
    const SEGMENT: usize = 256 << 10;
    let stop = 10_000_000_000;
    let max_prime = 3 * (32u64 << 10);

    let mut erat = SmallSieve::new();
    erat.init(stop, 32 << 10, max_prime).unwrap();
    for p in sieving_primes(7, max_prime) {
        erat.add_sieving_prime(p, 0).unwrap();
    }

    let mut sieve = vec![0xffu8; SEGMENT];
    let mut group = c.benchmark_group("cross_off");
    group.bench_function("256 KiB segment", |b| {
        b.iter(|| erat.cross_off(&mut sieve))
    });
    group.finish();
}

pub fn bench_pre_sieve(c: &mut Criterion) {
    const SEGMENT: usize = 256 << 10;

    let small = PreSieve::new();
    let mut large = PreSieve::new();
    large.init(0, 100_000_000_000).unwrap();

    let mut sieve = vec![0u8; SEGMENT];
    let mut group = c.benchmark_group("pre_sieve");
    group.bench_function("static table", |b| {
        b.iter(|| small.pre_sieve(&mut sieve, 30_030).unwrap())
    });
    group.bench_function("buffers", |b| {
        b.iter(|| large.pre_sieve(&mut sieve, 30_030).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_cross_off, bench_pre_sieve);
criterion_main!(benches);
