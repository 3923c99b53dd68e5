//! Deterministic group generation for tournament games
//!
//! Groups are lists of entrant indices, one per seat. Round-robin groupings
//! enumerate combinations by colexicographic unranking; sampled groupings
//! concatenate seeded shuffles of the entrant list. Shuffles and the game
//! order both use a Feistel-network permutation keyed from the seed.

use crate::random::SeededRng;

/// RNG stream reserved for the game-order permutation
const ORDER_STREAM: u64 = u64::MAX;

/// First RNG stream used for sampled shuffles; cycle `c` uses `SAMPLE_STREAM - c`
const SAMPLE_STREAM: u64 = u64::MAX - 1;

/// `C(n, k)`, saturating at `u64::MAX`.
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    acc as u64
}

/// Colexicographic combination unranking: rank → `k` ascending indices.
///
/// `rank = Σ C(c_i, i)` over the 1-based positions `i`.
pub fn unrank_combination(mut rank: u64, k: u32) -> Vec<u32> {
    let mut out = vec![0u32; k as usize];
    for i in (1..=k).rev() {
        // largest c with C(c, i) ≤ rank
        let mut c = i - 1;
        while binomial(c as u64 + 1, i as u64) <= rank {
            c += 1;
        }
        out[i as usize - 1] = c;
        rank -= binomial(c as u64, i as u64);
    }
    out
}

/// Every combination of `seats` distinct entrants, in colex order.
pub fn round_robin_groups(entrants: u32, seats: u32) -> Vec<Vec<u32>> {
    if seats == 0 || entrants < seats {
        return Vec::new();
    }
    let total = binomial(entrants as u64, seats as u64);
    (0..total).map(|rank| unrank_combination(rank, seats)).collect()
}

/// One game per entrant with that entrant in every seat.
pub fn homogeneous_groups(entrants: u32, seats: u32) -> Vec<Vec<u32>> {
    (0..entrants).map(|e| vec![e; seats as usize]).collect()
}

/// Number of sampled games needed for every entrant to appear at least
/// `games_per_entrant` times.
pub fn sampled_group_count(entrants: u32, seats: u32, games_per_entrant: u32) -> u64 {
    if seats == 0 {
        return 0;
    }
    (entrants as u64 * games_per_entrant as u64).div_ceil(seats as u64)
}

/// Seeded sampled groups.
///
/// The seat list is a concatenation of independently shuffled copies of the
/// entrant list, cut into groups of `seats`. Every entrant appears at least
/// `games_per_entrant` times and appearance counts differ by at most one.
/// A group straddling two shuffles may seat the same entrant twice.
pub fn sampled_groups(entrants: u32, seats: u32, games_per_entrant: u32, seed: &[u8; 32]) -> Vec<Vec<u32>> {
    let games = sampled_group_count(entrants, seats, games_per_entrant);
    if entrants == 0 || games == 0 {
        return Vec::new();
    }

    let slots = games * seats as u64;
    let mut lineup: Vec<u32> = Vec::with_capacity(slots as usize);
    let mut cycle = 0u64;
    while (lineup.len() as u64) < slots {
        let keys = derive_feistel_keys(seed, SAMPLE_STREAM - cycle);
        lineup.extend(permutation(entrants, &keys));
        cycle += 1;
    }
    lineup.truncate(slots as usize);

    lineup.chunks(seats as usize).map(<[u32]>::to_vec).collect()
}

/// Seeded permutation of `0..len`, used as the dispatch order of games.
pub fn permute_order(len: u32, seed: &[u8; 32]) -> Vec<u32> {
    permutation(len, &derive_feistel_keys(seed, ORDER_STREAM))
}

/// Rotate a group's seating by `trial` places.
pub fn rotate_seats(group: &[u32], trial: u32) -> Vec<u32> {
    let mut seated = group.to_vec();
    if !seated.is_empty() {
        let shift = trial as usize % seated.len();
        seated.rotate_left(shift);
    }
    seated
}

// ──────────────────────────── Internal helpers ────────────────────────────

fn permutation(len: u32, keys: &[u64; 6]) -> Vec<u32> {
    let permuted: Option<Vec<u32>> = (0..len).map(|i| feistel_permute(i, len, keys)).collect();
    permuted.unwrap_or_else(|| {
        log::warn!("feistel cycle walk did not settle for {} items; keeping natural order", len);
        (0..len).collect()
    })
}

/// Integer ceiling square root
fn isqrt_ceil(n: u32) -> u32 {
    if n <= 1 {
        return n;
    }
    // Newton's method for floor(sqrt(n))
    let mut x = n;
    let mut y = x.div_ceil(2);
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    if (x as u64) * (x as u64) == n as u64 {
        x
    } else {
        x + 1
    }
}

/// Feistel round function, result in [0, modulus)
fn feistel_round_fn(input: u32, key: u64, modulus: u32) -> u32 {
    (((input as u64).wrapping_mul(key | 1).wrapping_add(key >> 32)) >> 16) as u32 % modulus
}

fn derive_feistel_keys(seed: &[u8; 32], stream: u64) -> [u64; 6] {
    let mut rng = SeededRng::new(seed, stream);
    let mut keys = [0u64; 6];
    for k in &mut keys {
        *k = rng.next_u64();
    }
    keys
}

/// Bijective permutation on [0, domain_size) via a Feistel network with cycle-walking.
fn feistel_permute(idx: u32, domain_size: u32, round_keys: &[u64; 6]) -> Option<u32> {
    if domain_size <= 1 {
        return Some(0);
    }
    let half = isqrt_ceil(domain_size) as u64;

    let mut val = idx as u64;
    for _ in 0..1000 {
        let mut left = (val / half) as u32;
        let mut right = (val % half) as u32;

        for (i, &key) in round_keys.iter().enumerate() {
            if i % 2 == 0 {
                right = ((right as u64 + feistel_round_fn(left, key, half as u32) as u64) % half) as u32;
            } else {
                left = ((left as u64 + feistel_round_fn(right, key, half as u32) as u64) % half) as u32;
            }
        }

        val = left as u64 * half + right as u64;
        if val < domain_size as u64 {
            return Some(val as u32);
        }
        // cycle-walk: re-enter with the out-of-range value
    }
    None
}
