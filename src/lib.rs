//! Core of a segmented sieve of Eratosthenes on a modulo 30 wheel.
//!
//! Integers coprime to 30 occupy one bit each, eight per sieve byte, so a
//! byte covers 30 integers ([`BIT_VALUES`] gives the exact layout). Two
//! subsystems fill in the composites:
//!
//! - [`PreSieve`] initializes fresh segments with the multiples of the
//!   primes below 100 already removed, by ANDing precomputed buffers.
//! - [`SmallSieve`] crosses off the multiples of caller-registered sieving
//!   primes, resuming each prime's wheel state across segment boundaries.
//!
//! A segment driver allocates a byte buffer, calls
//! [`PreSieve::pre_sieve`] on it, then [`SmallSieve::cross_off`] with the
//! sieving primes above [`PreSieve::max_prime`], and finally decodes the
//! surviving bits with [`bit_value`]. The primes 2, 3 and 5 are not
//! representable and must be handled by the driver.

mod bits;
mod error;
mod presieve;
mod small_sieve;
mod tables;
mod wheel;

pub use bits::{
    bit_index, bit_position, bit_value, byte_index, clear_mask, residue, BIT0, BIT1, BIT2, BIT3,
    BIT4, BIT5, BIT6, BIT7, BIT_VALUES,
};
pub use error::{Error, Result};
pub use presieve::PreSieve;
pub use small_sieve::SmallSieve;
pub use wheel::{first_multiple, wheel_entry};
