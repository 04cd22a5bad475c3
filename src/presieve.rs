//! Pre-sieving of small prime multiples.
//!
//! Fresh sieve segments start out with the multiples of the primes below 100
//! already crossed off. Eight buffers are populated once, each holding one
//! full period of a distinct set of small primes:
//!
//! | buffer | primes       | size (bytes) |
//! |--------|--------------|--------------|
//! | 0      | {7, 67, 71}  | 33,299       |
//! | 1      | {11, 41, 73} | 32,923       |
//! | 2      | {13, 43, 59} | 32,981       |
//! | 3      | {17, 37, 53} | 33,337       |
//! | 4      | {19, 29, 61} | 33,611       |
//! | 5      | {23, 31, 47} | 33,511       |
//! | 6      | {79, 97}     | 7,663        |
//! | 7      | {83, 89}     | 7,387        |
//!
//! Initializing a segment is then a single pass that ANDs the eight buffers
//! together into the sieve. Until the cumulative sieving distance justifies
//! populating the buffers, a small embedded table covering only {7, 11, 13}
//! is copied instead.

use crate::error::{Error, Result};
use crate::small_sieve::SmallSieve;
use crate::tables::BUFFER_7_11_13;
use num_integer::Roots;
use tracing::{event, Level};

/// Primes crossed off by each pre-sieve buffer.
const BUFFER_PRIMES: [&[u64]; 8] = [
    &[7, 67, 71],
    &[11, 41, 73],
    &[13, 43, 59],
    &[17, 37, 53],
    &[19, 29, 61],
    &[23, 31, 47],
    &[79, 97],
    &[83, 89],
];

/// Combined distance covered by one period of every buffer.
const BUFFERS_DIST: u64 = (7 * 67 * 71) * 30
    + (11 * 41 * 73) * 30
    + (13 * 43 * 59) * 30
    + (17 * 37 * 53) * 30
    + (19 * 29 * 61) * 30
    + (23 * 31 * 47) * 30
    + (79 * 97) * 30
    + (83 * 89) * 30;

/// Bitwise AND the eight pre-sieve buffers into the output sieve.
///
/// The slices are disjoint by construction, which is what lets the compiler
/// turn this loop into wide vector instructions; the sources are narrowed to
/// the output length up front so the loop body is check-free.
#[allow(clippy::too_many_arguments)]
fn and_buffers(
    buf1: &[u8],
    buf2: &[u8],
    buf3: &[u8],
    buf4: &[u8],
    buf5: &[u8],
    buf6: &[u8],
    buf7: &[u8],
    buf8: &[u8],
    output: &mut [u8],
) {
    let bytes = output.len();
    let (buf1, buf2, buf3, buf4) = (&buf1[..bytes], &buf2[..bytes], &buf3[..bytes], &buf4[..bytes]);
    let (buf5, buf6, buf7, buf8) = (&buf5[..bytes], &buf6[..bytes], &buf7[..bytes], &buf8[..bytes]);
    for i in 0..bytes {
        output[i] =
            buf1[i] & buf2[i] & buf3[i] & buf4[i] & buf5[i] & buf6[i] & buf7[i] & buf8[i];
    }
}

/// Pre-sieve with the primes up to 13 using the embedded lookup table.
fn pre_sieve_small(sieve: &mut [u8], segment_low: u64) {
    let size = BUFFER_7_11_13.len();
    let prime_product = size as u64 * 30;
    let i = ((segment_low % prime_product) / 30) as usize;
    let size_left = size - i;

    if sieve.len() <= size_left {
        let len = sieve.len();
        sieve.copy_from_slice(&BUFFER_7_11_13[i..i + len]);
    } else {
        // copy the table's tail to the start of the sieve, then wrap
        // around its beginning as often as needed
        sieve[..size_left].copy_from_slice(&BUFFER_7_11_13[i..]);
        let mut offset = size_left;
        while offset + size <= sieve.len() {
            sieve[offset..offset + size].copy_from_slice(&BUFFER_7_11_13);
            offset += size;
        }
        let rest = sieve.len() - offset;
        sieve[offset..].copy_from_slice(&BUFFER_7_11_13[..rest]);
    }
}

/// Removes the multiples of the primes below 100 from freshly allocated
/// sieve segments.
///
/// Buffer population is deferred until the cumulative sieving distance seen
/// by [`init`] is at least 20 times the distance covered by the buffers, so
/// short-lived sieves never pay the initialization cost; they use the
/// embedded {7, 11, 13} table instead.
///
/// [`init`]: PreSieve::init
#[derive(Debug)]
pub struct PreSieve {
    buffers: [Vec<u8>; 8],
    max_prime: u64,
    total_dist: u64,
}

impl Default for PreSieve {
    fn default() -> Self {
        Self::new()
    }
}

impl PreSieve {
    pub fn new() -> Self {
        Self {
            buffers: Default::default(),
            max_prime: 13,
            total_dist: 0,
        }
    }

    /// Largest prime whose multiples are currently pre-sieved.
    ///
    /// Sieving primes up to this bound must not be handed to a cross-off
    /// engine as well.
    pub fn max_prime(&self) -> u64 {
        self.max_prime
    }

    /// Account a sieving interval and populate the eight buffers once the
    /// cumulative distance is large enough to amortize their cost.
    ///
    /// Callers that subdivide their sieving distance (for example when
    /// iterating backwards) invoke this once per chunk; the decision is
    /// based on the running total.
    pub fn init(&mut self, start: u64, stop: u64) -> Result<()> {
        let dist = (start.max(stop) - start).max(stop.sqrt());
        self.total_dist = self.total_dist.saturating_add(dist);

        if !self.buffers[0].is_empty() {
            return Ok(());
        }
        if self.total_dist < BUFFERS_DIST * 20 {
            return Ok(());
        }
        self.init_buffers()
    }

    fn init_buffers(&mut self) -> Result<()> {
        for (buffer, primes) in self.buffers.iter_mut().zip(BUFFER_PRIMES) {
            let product: u64 = 30 * primes.iter().product::<u64>();
            let size = (product / 30) as usize;
            let start = product;
            let stop = start + product;
            let max_prime = *primes.last().unwrap();

            buffer.try_reserve_exact(size)?;
            buffer.resize(size, 0xff);

            // a private, transient engine populates the buffer
            let mut erat = SmallSieve::new();
            erat.init(stop, size as u64, max_prime)?;
            for &prime in primes {
                erat.add_sieving_prime(prime, start)?;
            }
            erat.cross_off(buffer);

            self.max_prime = self.max_prime.max(max_prime);
        }
        event!(
            Level::DEBUG,
            bytes = BUFFERS_DIST / 30,
            "pre-sieve buffers initialized"
        );
        Ok(())
    }

    /// Initialize a sieve segment: every bit whose integer is divisible by
    /// one of the pre-sieved primes is cleared, all other bits are set.
    ///
    /// `segment_low` is the absolute value of the segment's first byte and
    /// must be a multiple of 30. The bits of the pre-sieved primes
    /// themselves are restored afterwards so they still read as prime.
    pub fn pre_sieve(&self, sieve: &mut [u8], segment_low: u64) -> Result<()> {
        if segment_low % 30 != 0 {
            return Err(Error::InvalidParameter("segmentLow must be a multiple of 30"));
        }

        if self.buffers[0].is_empty() {
            pre_sieve_small(sieve, segment_low);
        } else {
            self.pre_sieve_large(sieve, segment_low);
        }

        // Pre-sieving also removed the primes below 100 themselves. Undo
        // that for the affected low bytes (49 = 7 * 7 and friends stay
        // composite).
        let bit49 = 1 << 4;
        let bit77 = 1 << 3;
        let bit91 = 1 << 7;
        let bit119 = 1 << 6;
        let bit121 = 1 << 7;

        let mut i = 0;
        if segment_low < 30 && i < sieve.len() {
            sieve[i] = 0xff;
            i += 1;
        }
        if segment_low < 60 && i < sieve.len() {
            sieve[i] = 0xff ^ bit49;
            i += 1;
        }
        if segment_low < 90 && i < sieve.len() {
            sieve[i] = 0xff ^ bit77 ^ bit91;
            i += 1;
        }
        if segment_low < 120 && i < sieve.len() {
            sieve[i] = 0xff ^ bit119 ^ bit121;
        }
        Ok(())
    }

    /// Pre-sieve with the primes below 100 by ANDing the eight buffers.
    fn pre_sieve_large(&self, sieve: &mut [u8], segment_low: u64) {
        let mut pos = [0usize; 8];
        for (pos, buffer) in pos.iter_mut().zip(&self.buffers) {
            *pos = ((segment_low % (buffer.len() as u64 * 30)) / 30) as usize;
        }

        let mut offset = 0;
        while offset < sieve.len() {
            let mut chunk = sieve.len() - offset;
            for (pos, buffer) in pos.iter().zip(&self.buffers) {
                chunk = chunk.min(buffer.len() - pos);
            }

            and_buffers(
                &self.buffers[0][pos[0]..],
                &self.buffers[1][pos[1]..],
                &self.buffers[2][pos[2]..],
                &self.buffers[3][pos[3]..],
                &self.buffers[4][pos[4]..],
                &self.buffers[5][pos[5]..],
                &self.buffers[6][pos[6]..],
                &self.buffers[7][pos[7]..],
                &mut sieve[offset..offset + chunk],
            );

            offset += chunk;
            for (pos, buffer) in pos.iter_mut().zip(&self.buffers) {
                *pos += chunk;
                if *pos >= buffer.len() {
                    *pos = 0;
                }
            }
        }
    }
}
