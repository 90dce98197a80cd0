//! Display name allocation for new sessions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{NAME_PREFIX, NAME_SPAN};

use crate::error::IdentityError;

/// Draws names of the form `Guest0042` from a fixed numeric span.
///
/// Uniqueness is only checked against the names passed in at the moment
/// of the call, so a name becomes available again once its holder leaves.
pub struct IdentityAllocator {
    rng: StdRng,
    prefix: String,
    span: u32,
    max_attempts: u32,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            prefix: NAME_PREFIX.to_string(),
            span: NAME_SPAN,
            max_attempts: NAME_SPAN.saturating_mul(8),
        }
    }

    /// Shrinks the namespace; used to exercise exhaustion.
    pub fn with_span(mut self, span: u32) -> Self {
        self.span = span.max(1);
        self.max_attempts = self.span.saturating_mul(8);
        self
    }

    pub fn allocate<F>(&mut self, is_taken: F) -> Result<String, IdentityError>
    where
        F: Fn(&str) -> bool,
    {
        let width = digits(self.span - 1);
        for _ in 0..self.max_attempts {
            let n = self.rng.gen_range(0..self.span);
            let name = format!("{}{:0width$}", self.prefix, n, width = width);
            if !is_taken(&name) {
                return Ok(name);
            }
        }

        Err(IdentityError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn digits(mut n: u32) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}
