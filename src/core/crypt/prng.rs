/*
 * Copyright 2026 The sfse authors
 *
 * This file is part of sfse.
 *
 * sfse is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * sfse is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * sfse. If not, see <https://www.gnu.org/licenses/>.
 */

//! A CPython-`random`-module-compatible Mersenne Twister, used to key the
//! shuffle and noise steps of the sector crypt layer (see [`crate::crypt`]).
//!
//! The reference prototype seeds Python's `random.Random` with the arbitrary-
//! precision integer `int(combined.hex(), 16)`, where `combined` is
//! `key || be32(block index) || pin digest`, then drives `shuffle()` and
//! `randint(0, 255)` from it. To stay byte-identical with devices written by
//! that prototype, this module reimplements, rather than approximates, the
//! pieces of CPython actually exercised: the big-integer seeding procedure
//! (`init_by_array`), the MT19937 core (`genrand_uint32`), `getrandbits`, and
//! the rejection-sampling `_randbelow` that both `shuffle` and `randint` are
//! built on.

const N: usize = 624;
const M: usize = 397;
const MATRIX_A: u32 = 0x9908_b0df;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7fff_ffff;

/// Converts an arbitrary-length big-endian byte string into the little-endian
/// 32-bit word array CPython's `random_seed` builds from a Python `int`: the
/// minimal number of words needed to hold the integer's value, most
/// significant words dropped when they are zero (never below one word).
fn seed_key_words(seed_bytes: &[u8]) -> Vec<u32> {
    let mut padded = seed_bytes.to_vec();
    let rem = padded.len() % 4;
    if rem != 0 {
        let mut lead = vec![0u8; 4 - rem];
        lead.extend_from_slice(&padded);
        padded = lead;
    }
    let mut words: Vec<u32> = padded
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    words.reverse();
    while words.len() > 1 && *words.last().unwrap() == 0 {
        words.pop();
    }
    words
}

/// `init_genrand` from the reference MT19937 implementation.
fn init_genrand(seed: u32) -> [u32; N] {
    let mut mt = [0u32; N];
    mt[0] = seed;
    for i in 1..N {
        mt[i] = 1_812_433_253u32
            .wrapping_mul(mt[i - 1] ^ (mt[i - 1] >> 30))
            .wrapping_add(i as u32);
    }
    mt
}

/// `init_by_array` from the reference MT19937 implementation; this is the
/// routine CPython's `random.seed` uses for any non-empty key.
fn init_by_array(key: &[u32]) -> [u32; N] {
    let mut mt = init_genrand(19_650_218);
    let mut i = 1usize;
    let mut j = 0usize;
    let mut k = N.max(key.len());
    while k > 0 {
        mt[i] = (mt[i] ^ ((mt[i - 1] ^ (mt[i - 1] >> 30)).wrapping_mul(1_664_525)))
            .wrapping_add(key[j])
            .wrapping_add(j as u32);
        i += 1;
        j += 1;
        if i >= N {
            mt[0] = mt[N - 1];
            i = 1;
        }
        if j >= key.len() {
            j = 0;
        }
        k -= 1;
    }
    k = N - 1;
    while k > 0 {
        mt[i] = (mt[i] ^ ((mt[i - 1] ^ (mt[i - 1] >> 30)).wrapping_mul(1_566_083_941)))
            .wrapping_sub(i as u32);
        i += 1;
        if i >= N {
            mt[0] = mt[N - 1];
            i = 1;
        }
        k -= 1;
    }
    mt[0] = 0x8000_0000;
    mt
}

/// A Mersenne Twister (MT19937) generator seeded exactly as CPython's
/// `random.Random(seed)` seeds from an arbitrary-precision integer.
pub struct Rng {
    state: [u32; N],
    index: usize,
}

impl Rng {
    /// Creates a generator seeded from the big-endian integer interpretation
    /// of `seed_bytes`, matching `random.Random(int(seed_bytes.hex(), 16))`.
    pub fn new(seed_bytes: &[u8]) -> Self {
        let key = seed_key_words(seed_bytes);
        Self {
            state: init_by_array(&key),
            index: N,
        }
    }

    fn regenerate(&mut self) {
        for kk in 0..N {
            let y = (self.state[kk] & UPPER_MASK) | (self.state[(kk + 1) % N] & LOWER_MASK);
            let mut next = self.state[(kk + M) % N] ^ (y >> 1);
            if y & 1 != 0 {
                next ^= MATRIX_A;
            }
            self.state[kk] = next;
        }
        self.index = 0;
    }

    /// `genrand_uint32`: the tempered MT19937 output word.
    fn next_u32(&mut self) -> u32 {
        if self.index >= N {
            self.regenerate();
        }
        let mut y = self.state[self.index];
        self.index += 1;
        y ^= y >> 11;
        y ^= (y << 7) & 0x9d2c_5680;
        y ^= (y << 15) & 0xefc6_0000;
        y ^= y >> 18;
        y
    }

    /// CPython's `getrandbits(k)`, for `1 <= k <= 64`.
    fn getrandbits(&mut self, k: u32) -> u64 {
        debug_assert!(k > 0 && k <= 64);
        if k <= 32 {
            return (self.next_u32() >> (32 - k)) as u64;
        }
        let words = ((k - 1) / 32 + 1) as usize;
        let mut remaining = k;
        let mut result: u64 = 0;
        for i in 0..words {
            let mut r = self.next_u32();
            if remaining < 32 {
                r >>= 32 - remaining;
            }
            result |= (r as u64) << (32 * i as u32);
            remaining = remaining.saturating_sub(32);
        }
        result
    }

    /// CPython's `_randbelow_with_getrandbits`: a uniform value in `0..n` via
    /// rejection sampling at the bit width of `n`.
    pub fn below(&mut self, n: u64) -> u64 {
        debug_assert!(n > 0);
        let k = 64 - n.leading_zeros();
        loop {
            let r = self.getrandbits(k);
            if r < n {
                return r;
            }
        }
    }
}

/// Performs an in-place Fisher-Yates (Durstenfeld) shuffle of `data`, seeded
/// from `seed_bytes`, matching `random.Random(seed).shuffle(data)`. Returns
/// the sequence of swaps performed, in order, so that [`unshuffle`] can undo
/// exactly this permutation.
pub fn shuffle(seed_bytes: &[u8], data: &mut [u8]) -> Vec<(usize, usize)> {
    let mut rng = Rng::new(seed_bytes);
    let mut swaps = Vec::with_capacity(data.len().saturating_sub(1));
    for i in (1..data.len()).rev() {
        let j = rng.below((i + 1) as u64) as usize;
        data.swap(i, j);
        swaps.push((i, j));
    }
    swaps
}

/// Inverts a permutation produced by [`shuffle`] by replaying its swaps in
/// reverse order (each swap is its own inverse).
pub fn unshuffle(seed_bytes: &[u8], data: &mut [u8]) {
    // Recompute (rather than store) the swap sequence: `seed_bytes` plus the
    // length of `data` fully determines it, since `Rng::below` only depends on
    // the index bound, not on the data being shuffled.
    let mut rng = Rng::new(seed_bytes);
    let mut swaps = Vec::with_capacity(data.len().saturating_sub(1));
    for i in (1..data.len()).rev() {
        swaps.push((i, rng.below((i + 1) as u64) as usize));
    }
    for (i, j) in swaps.into_iter().rev() {
        data.swap(i, j);
    }
}

/// Generates `len` pseudorandom bytes from a fresh generator seeded from
/// `seed_bytes` (independent of any [`shuffle`]/[`unshuffle`] state),
/// matching `random.seed(seed); [random.randint(0, 255) for _ in range(len)]`.
pub fn stream(seed_bytes: &[u8], len: usize) -> Vec<u8> {
    let mut rng = Rng::new(seed_bytes);
    (0..len).map(|_| rng.below(256) as u8).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    /// `random.Random(0).getrandbits(32)` in CPython is `3626764237`.
    #[test]
    fn genrand_uint32_matches_cpython_for_seed_zero() {
        let mut rng = Rng::new(&0u32.to_be_bytes());
        assert_eq!(rng.next_u32(), 3_626_764_237);
    }

    /// `random.Random(1).getrandbits(32)` in CPython is `577090037`.
    #[test]
    fn genrand_uint32_matches_cpython_for_seed_one() {
        let mut rng = Rng::new(&1u32.to_be_bytes());
        assert_eq!(rng.next_u32(), 577_090_037);
    }

    /// Cross-checked against CPython: for `combined = bytes(range(52))`,
    /// `seed = int(combined.hex(), 16)`, `random.Random(seed).shuffle(bytearray(range(16)))`
    /// produces this exact permutation.
    #[test]
    fn shuffle_matches_cpython_reference_vector() {
        let seed_bytes: Vec<u8> = (0..52u8).collect();
        let mut data: Vec<u8> = (0..16u8).collect();
        shuffle(&seed_bytes, &mut data);
        assert_eq!(
            data,
            vec![15, 4, 11, 1, 13, 12, 2, 5, 7, 8, 0, 9, 14, 6, 10, 3]
        );
    }

    /// Cross-checked against CPython: for the same seed, `random.seed(seed)`
    /// then `[random.randint(0, 255) for _ in range(16)]` produces this exact
    /// byte sequence.
    #[test]
    fn stream_matches_cpython_reference_vector() {
        let seed_bytes: Vec<u8> = (0..52u8).collect();
        let noise = stream(&seed_bytes, 16);
        assert_eq!(
            noise,
            vec![59, 206, 12, 244, 162, 152, 37, 165, 69, 62, 80, 226, 109, 28, 226, 165]
        );
    }

    #[test]
    fn shuffle_unshuffle_round_trip() {
        let seed = b"some seed bytes";
        let original: Vec<u8> = (0..=255u8).collect();
        let mut data = original.clone();
        shuffle(seed, &mut data);
        assert_ne!(data, original);
        unshuffle(seed, &mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn stream_is_deterministic() {
        let seed = b"another seed";
        assert_eq!(stream(seed, 32), stream(seed, 32));
        assert_ne!(stream(seed, 32), stream(b"different seed", 32));
    }

    #[test]
    fn stream_covers_full_byte_range_with_enough_samples() {
        let seed = b"coverage seed";
        let bytes = stream(seed, 100_000);
        let distinct: std::collections::HashSet<_> = bytes.iter().collect();
        assert_eq!(distinct.len(), 256);
    }
}
