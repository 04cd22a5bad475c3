use std::collections::TryReserveError;
use thiserror::Error;

/// Errors surfaced by the sieve core.
///
/// Cross-off and pre-sieve application are total once initialization has
/// succeeded; every failure below is reported at the call site and never
/// retried.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-provided precondition was violated.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The allocator refused a reservation.
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
}

pub type Result<T> = std::result::Result<T, Error>;
