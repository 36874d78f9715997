use rand::Rng;
use thiserror::Error;

use crate::bitmap::Bitmap;
use crate::resources::Port;
use crate::{MAX_RAND_PORT_ATTEMPTS, MAX_VALID_PORT};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortSelectionError {
    /// The random probes ran out of attempts. Recoverable: the precise
    /// selector may still find free ports.
    #[error("stochastic dynamic port selection failed")]
    StochasticExhausted,
    /// The range genuinely has fewer free ports than asked for.
    #[error("dynamic port selection failed")]
    RangeExhausted,
}

/// Picks `count` unused ports by random probing. Each pick gets up to
/// [`MAX_RAND_PORT_ATTEMPTS`] draws from `[min, max)` (the upper bound is
/// exclusive here, unlike the precise scan) and rejects ports that are set in
/// `used`, listed in `reserved`, or already picked in this call.
pub fn dynamic_ports_stochastic(
    used: Option<&Bitmap>,
    min: u16,
    max: u16,
    reserved: &[Port],
    count: usize,
    rng: &mut impl Rng,
) -> Result<Vec<u16>, PortSelectionError> {
    let reserved: Vec<i32> = reserved.iter().map(|port| port.value).collect();
    let mut dynamic: Vec<u16> = Vec::with_capacity(count);

    for _ in 0..count {
        let mut attempts = 0;
        loop {
            attempts += 1;
            if attempts > MAX_RAND_PORT_ATTEMPTS {
                return Err(PortSelectionError::StochasticExhausted);
            }

            let candidate = min + rng.gen_range(0..max - min);
            if used.is_some_and(|used| used.check(usize::from(candidate))) {
                continue;
            }
            if reserved.contains(&i32::from(candidate)) || dynamic.contains(&candidate) {
                continue;
            }

            dynamic.push(candidate);
            break;
        }
    }

    Ok(dynamic)
}

/// Picks `count` unused ports by scanning the full `[min, max]` range of the
/// used-port bitmap. Failure here is definitive: the ask cannot be satisfied.
pub fn dynamic_ports_precise(
    used: Option<&Bitmap>,
    min: u16,
    max: u16,
    reserved: &[Port],
    count: usize,
    rng: &mut impl Rng,
) -> Result<Vec<u16>, PortSelectionError> {
    // Work on a copy so the caller's bitmap stays untouched.
    let mut used_set = match used {
        Some(used) => used.clone(),
        None => Bitmap::new(MAX_VALID_PORT),
    };
    for port in reserved {
        used_set.set(port.value as usize);
    }

    let mut free = used_set.indexes_in_range(false, usize::from(min), usize::from(max));
    if free.len() < count {
        return Err(PortSelectionError::RangeExhausted);
    }

    // Randomize only the prefix we hand out; each slot swaps with a partner
    // drawn from the whole free list.
    let available = free.len();
    for i in 0..count {
        let j = rng.gen_range(0..available);
        free.swap(i, j);
    }

    Ok(free[..count].iter().map(|&port| port as u16).collect())
}
