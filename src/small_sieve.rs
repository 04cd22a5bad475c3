//! Cross-off engine for small sieving primes.
//!
//! Small primes have many multiples per segment, so the initialization cost
//! per segment hardly matters; what matters is that crossing off a single
//! multiple takes as few instructions as possible. The engine therefore
//! dispatches every prime into one of 64 wheel states (8 residue lanes of 8
//! steps each) and, whenever a prime is aligned at the start of its cycle,
//! removes the next 8 multiples in one straight-line block whose byte
//! offsets are compile-time constants.

use crate::error::{Error, Result};
use crate::wheel::{first_multiple, hot_lane, WheelStep, WHEEL30_LANES};
use tracing::{event, Level};

/// Per-prime cross-off state, carried across segments.
#[derive(Debug, Clone, Copy)]
struct SievingPrime {
    /// The prime divided by 30; its residue is implied by the wheel lane.
    sieving_prime: u64,
    /// Byte offset of the next multiple within the current segment. Values
    /// beyond the segment size carry into later segments.
    multiple_index: u64,
    /// Wheel state, `lane * 8 + step`, always below 64.
    wheel_index: u64,
}

/// Segmented sieve of Eratosthenes with a hardcoded modulo 30 wheel,
/// optimized for sieving primes that have many multiples per segment.
///
/// The caller owns the sieve bytes; [`SmallSieve`] only owns the sieving
/// primes and their resume state, so consecutive [`cross_off`] calls over
/// adjacent segments produce the same bits as one call over their union.
///
/// [`cross_off`]: SmallSieve::cross_off
#[derive(Debug, Default)]
pub struct SmallSieve {
    primes: Vec<SievingPrime>,
    stop: u64,
    max_prime: u64,
    l1_cache_size: u64,
    enabled: bool,
}

/// Upper bound approximation of the prime counting function, used to size
/// the sieving prime vector up front.
fn prime_count_approx(n: u64) -> usize {
    if n < 10 {
        return 4;
    }
    let x = n as f64;
    (x / (x.ln() - 1.1)) as usize + 5
}

/// Cross off the multiples of one sieving prime inside one sub-segment.
///
/// `$lane` selects the residue lane and `$residue` is that lane's residue.
/// While the prime is aligned at step 0 and a full 8-step cycle fits below
/// `$loop_end`, the unrolled block runs; otherwise single steps execute from
/// the lane table, stopping as soon as the byte index reaches `$end`.
macro_rules! cross_off_lane {
    ($sieve:ident, $sp:ident, $i:ident, $step:ident, $end:ident, $loop_end:ident,
     $lane:literal, $residue:literal) => {{
        const LANE: [WheelStep; 8] = WHEEL30_LANES[$lane];
        const HOT: [WheelStep; 8] = hot_lane($lane);
        loop {
            if $step == 0 {
                // i < loop_end guarantees all 8 offsets below stay in bounds
                while $i < $loop_end {
                    $sieve[$i + $sp * HOT[0].mul + HOT[0].add] &= HOT[0].mask;
                    $sieve[$i + $sp * HOT[1].mul + HOT[1].add] &= HOT[1].mask;
                    $sieve[$i + $sp * HOT[2].mul + HOT[2].add] &= HOT[2].mask;
                    $sieve[$i + $sp * HOT[3].mul + HOT[3].add] &= HOT[3].mask;
                    $sieve[$i + $sp * HOT[4].mul + HOT[4].add] &= HOT[4].mask;
                    $sieve[$i + $sp * HOT[5].mul + HOT[5].add] &= HOT[5].mask;
                    $sieve[$i + $sp * HOT[6].mul + HOT[6].add] &= HOT[6].mask;
                    $sieve[$i + $sp * HOT[7].mul + HOT[7].add] &= HOT[7].mask;
                    $i += $sp * 30 + $residue;
                }
            }
            if $i >= $end {
                break;
            }
            match $step {
                0 => { $sieve[$i] &= LANE[0].mask; $i += $sp * LANE[0].mul + LANE[0].add; }
                1 => { $sieve[$i] &= LANE[1].mask; $i += $sp * LANE[1].mul + LANE[1].add; }
                2 => { $sieve[$i] &= LANE[2].mask; $i += $sp * LANE[2].mul + LANE[2].add; }
                3 => { $sieve[$i] &= LANE[3].mask; $i += $sp * LANE[3].mul + LANE[3].add; }
                4 => { $sieve[$i] &= LANE[4].mask; $i += $sp * LANE[4].mul + LANE[4].add; }
                5 => { $sieve[$i] &= LANE[5].mask; $i += $sp * LANE[5].mul + LANE[5].add; }
                6 => { $sieve[$i] &= LANE[6].mask; $i += $sp * LANE[6].mul + LANE[6].add; }
                _ => { $sieve[$i] &= LANE[7].mask; $i += $sp * LANE[7].mul + LANE[7].add; }
            }
            $step = ($step + 1) & 7;
        }
    }};
}

impl SmallSieve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the engine for sieving up to `stop`, crossing off primes up to
    /// `max_prime` in sub-segments of `l1_cache_size` bytes.
    ///
    /// Fails with [`Error::InvalidParameter`] unless
    /// `max_prime <= l1_cache_size * 3`; beyond that ratio a prime may have
    /// no multiple in a sub-segment and belongs in a different kind of
    /// cross-off engine.
    pub fn init(&mut self, stop: u64, l1_cache_size: u64, max_prime: u64) -> Result<()> {
        if l1_cache_size == 0 {
            return Err(Error::InvalidParameter("l1CacheSize must be non-zero"));
        }
        if max_prime > l1_cache_size.saturating_mul(3) {
            return Err(Error::InvalidParameter("maxPrime > l1CacheSize * 3"));
        }

        self.enabled = true;
        self.stop = stop;
        self.max_prime = max_prime;
        self.l1_cache_size = l1_cache_size;

        let count = prime_count_approx(max_prime);
        self.primes.try_reserve(count)?;
        event!(
            Level::DEBUG,
            stop,
            l1_cache_size,
            max_prime,
            reserved = count,
            "small sieve initialized"
        );
        Ok(())
    }

    /// Append a sieving prime with a precomputed wheel state.
    pub fn store_sieving_prime(
        &mut self,
        prime: u64,
        multiple_index: u64,
        wheel_index: u64,
    ) -> Result<()> {
        if prime > self.max_prime {
            return Err(Error::InvalidParameter("prime exceeds maxPrime"));
        }
        self.primes.push(SievingPrime {
            sieving_prime: prime / 30,
            multiple_index,
            wheel_index: wheel_index & 63,
        });
        Ok(())
    }

    /// Append a sieving prime, computing its initial wheel state from the
    /// segment base. Primes whose first multiple exceeds `stop` are skipped.
    pub fn add_sieving_prime(&mut self, prime: u64, segment_low: u64) -> Result<()> {
        debug_assert_eq!(segment_low % 30, 0);
        if let Some((multiple_index, wheel_index)) = first_multiple(prime, segment_low, self.stop) {
            self.store_sieving_prime(prime, multiple_index, wheel_index)?;
        }
        Ok(())
    }

    /// Pick a sub-segment size from an injected CPU cache hint: the hint is
    /// limited to the sieve size and clamped to [8 KiB, 4 MiB]. Without a
    /// hint the sieve size itself is used.
    pub fn l1_cache_size(hint: Option<u64>, sieve_size: u64) -> u64 {
        match hint {
            None => sieve_size,
            Some(size) => size.min(sieve_size).clamp(8 << 10, 4096 << 10),
        }
    }

    /// Cross off the multiples of all stored sieving primes and update their
    /// resume state. Infallible and allocation-free.
    ///
    /// The sieve is processed in sub-segments of `l1_cache_size` bytes so
    /// reads and writes stay cache-resident even when the caller's segment
    /// is sized for a larger cache level.
    pub fn cross_off(&mut self, sieve: &mut [u8]) {
        if !self.enabled {
            return;
        }
        for chunk in sieve.chunks_mut(self.l1_cache_size as usize) {
            Self::cross_off_segment(&mut self.primes, chunk);
        }
    }

    fn cross_off_segment(primes: &mut [SievingPrime], sieve: &mut [u8]) {
        let end = sieve.len();
        for prime in primes {
            let sp = prime.sieving_prime as usize;
            let mut i = prime.multiple_index as usize;
            let mut step = (prime.wheel_index & 7) as usize;

            // region where one full 8-step cycle is guaranteed to fit
            let max_loop_dist = sp * 28 + 27;
            let loop_end = end.max(max_loop_dist) - max_loop_dist;

            match prime.wheel_index >> 3 {
                0 => cross_off_lane!(sieve, sp, i, step, end, loop_end, 0, 7),
                1 => cross_off_lane!(sieve, sp, i, step, end, loop_end, 1, 11),
                2 => cross_off_lane!(sieve, sp, i, step, end, loop_end, 2, 13),
                3 => cross_off_lane!(sieve, sp, i, step, end, loop_end, 3, 17),
                4 => cross_off_lane!(sieve, sp, i, step, end, loop_end, 4, 19),
                5 => cross_off_lane!(sieve, sp, i, step, end, loop_end, 5, 23),
                6 => cross_off_lane!(sieve, sp, i, step, end, loop_end, 6, 29),
                _ => cross_off_lane!(sieve, sp, i, step, end, loop_end, 7, 1),
            }

            // carry the overshoot into the next segment
            prime.multiple_index = (i - end) as u64;
            prime.wheel_index = (prime.wheel_index & !7) | step as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitvec::prelude::*;

    /// Composite flags for 0..limit, teacher for the tests below.
    fn composite_table(limit: usize) -> BitVec {
        let mut composite = bitvec![0; limit];
        composite.set(0, true);
        if limit > 1 {
            composite.set(1, true);
        }
        for n in 2..limit {
            if composite[n] {
                continue;
            }
            for multiple in (n * 2..limit).step_by(n) {
                composite.set(multiple, true);
            }
        }
        composite
    }

    fn primes_between(low: u64, high: u64) -> Vec<u64> {
        let composite = composite_table(high as usize + 1);
        (low..=high).filter(|&n| !composite[n as usize]).collect()
    }

    #[test]
    fn init_rejects_oversized_primes() {
        let mut erat = SmallSieve::new();
        assert!(matches!(
            erat.init(1_000_000, 1024, 4000),
            Err(Error::InvalidParameter(_))
        ));
        assert!(erat.init(1_000_000, 2048, 4000).is_ok());
    }

    #[test]
    fn store_rejects_primes_beyond_the_declared_bound() {
        let mut erat = SmallSieve::new();
        erat.init(10_000, 1024, 100).unwrap();
        assert!(erat.store_sieving_prime(97, 0, 0).is_ok());
        assert!(matches!(
            erat.store_sieving_prime(101, 0, 0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn l1_cache_size_is_clamped() {
        assert_eq!(SmallSieve::l1_cache_size(None, 1 << 20), 1 << 20);
        assert_eq!(SmallSieve::l1_cache_size(Some(32 << 10), 1 << 20), 32 << 10);
        assert_eq!(SmallSieve::l1_cache_size(Some(1 << 10), 1 << 20), 8 << 10);
        assert_eq!(SmallSieve::l1_cache_size(Some(16 << 20), 1 << 30), 4096 << 10);
        // tiny sieves are still clamped up to the minimum
        assert_eq!(SmallSieve::l1_cache_size(Some(32 << 10), 1 << 10), 8 << 10);
    }

    #[test]
    fn crosses_off_the_multiples_of_seven() {
        // sieve [0, 210) with the single sieving prime 7
        let mut sieve = [0xffu8; 7];
        let mut erat = SmallSieve::new();
        erat.init(210, 7, 7).unwrap();
        let (index, wheel) = first_multiple(7, 0, 210).unwrap();
        assert_eq!((index, wheel), (1, 1));
        erat.store_sieving_prime(7, index, wheel).unwrap();
        erat.cross_off(&mut sieve);

        // 49, 77, 91, 119, 133, 161 and 203 are gone, everything else stays
        assert_eq!(sieve, [0xff, 0xef, 0x77, 0xbf, 0xfb, 0xfd, 0xdf]);
    }

    #[test]
    fn cross_off_matches_trial_division() {
        use crate::bits::bit_value;

        // a small base, a random mid-range base and a base around 10^9
        let random_base = 30 * (rand::random::<u16>() as u64);
        for (segment_low, bytes) in [(0u64, 512usize), (random_base, 300), (999_999_990, 1024)] {
            let stop = segment_low + 30 * bytes as u64 + 31;
            let max_prime = num_integer::sqrt(stop) + 1;
            let primes = primes_between(7, max_prime);

            let mut erat = SmallSieve::new();
            erat.init(stop, max_prime, max_prime).unwrap();
            for &p in &primes {
                erat.add_sieving_prime(p, segment_low).unwrap();
            }
            let mut sieve = vec![0xffu8; bytes];
            erat.cross_off(&mut sieve);

            for (b, byte) in sieve.iter().enumerate() {
                for bit in 0..8 {
                    let value = segment_low + bit_value(b as u64, bit);
                    let has_factor = primes
                        .iter()
                        .take_while(|&&p| p * p <= value)
                        .any(|&p| value % p == 0);
                    let is_prime = !has_factor && value > 1;
                    assert_eq!(
                        byte & (1 << bit) != 0,
                        is_prime,
                        "wrong bit for {value} (byte {b}, bit {bit})"
                    );
                }
            }
        }
    }

    #[test]
    fn resuming_across_segments_is_bit_identical() {
        let stop = 30 * 2048;
        let max_prime = num_integer::sqrt(stop);
        let primes = primes_between(7, max_prime);

        let mut whole = vec![0xffu8; 2048];
        let mut erat = SmallSieve::new();
        erat.init(stop, 256, max_prime).unwrap();
        for &p in &primes {
            erat.add_sieving_prime(p, 0).unwrap();
        }
        erat.cross_off(&mut whole);

        let mut first = vec![0xffu8; 1024];
        let mut second = vec![0xffu8; 1024];
        let mut erat = SmallSieve::new();
        erat.init(stop, 256, max_prime).unwrap();
        for &p in &primes {
            erat.add_sieving_prime(p, 0).unwrap();
        }
        erat.cross_off(&mut first);
        erat.cross_off(&mut second);

        assert_eq!(whole[..1024], first[..]);
        assert_eq!(whole[1024..], second[..]);
    }

    #[test]
    fn mid_cycle_entry_walks_the_remaining_steps() {
        // with 1-byte segments every step boundary becomes a segment
        // boundary, so all 64 entry points get exercised
        let stop = 30 * 64;
        let primes = primes_between(7, num_integer::sqrt(stop));

        let mut whole = vec![0xffu8; 64];
        let mut erat = SmallSieve::new();
        erat.init(stop, 64, num_integer::sqrt(stop)).unwrap();
        for &p in &primes {
            erat.add_sieving_prime(p, 0).unwrap();
        }
        erat.cross_off(&mut whole);

        let mut stitched = vec![0xffu8; 64];
        let mut erat = SmallSieve::new();
        erat.init(stop, 64, num_integer::sqrt(stop)).unwrap();
        for &p in &primes {
            erat.add_sieving_prime(p, 0).unwrap();
        }
        for byte in stitched.chunks_mut(1) {
            erat.cross_off(byte);
        }

        assert_eq!(whole, stitched);
    }
}
