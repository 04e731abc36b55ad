//! HyperLogLog (C3): a probabilistic distinct-count sketch.
//!
//! Fixed at precision `p = 14` (`m = 2^14 = 16384` registers), matching the
//! storage core's requirement that sketches merged across columns or
//! snapshot/delta boundaries are always register-compatible.

use grizzly_types::Value;
use tracing::trace;

/// Precision: number of bits used to select a register.
pub const PRECISION: u32 = 14;
/// Number of registers, `2^PRECISION`.
pub const NUM_REGISTERS: usize = 1 << PRECISION;
/// Bias-correction constant for `m = 16384` (`0.7213 / (1 + 1.079 / m)`
/// converges to the classic fixed constant used for large `m`).
pub const ALPHA: f64 = 0.673;

const TWO_POW_32: f64 = 4_294_967_296.0;

/// An approximate distinct-count sketch over process-local registers.
///
/// Registers are `u8` (classic HyperLogLog never needs more than a handful
/// of bits to represent the maximum leading-zero run for any realistic
/// cardinality). Each register stores `max(observed leading-zero run) + 1`,
/// per the storage core's invariant.
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    registers: Box<[u8; NUM_REGISTERS]>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    /// Create an empty sketch (all registers zeroed).
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: Box::new([0_u8; NUM_REGISTERS]),
        }
    }

    /// Observe one value.
    pub fn add(&mut self, value: &Value<'_>) {
        let hash = value.stable_hash();
        self.add_hash(hash);
    }

    /// Observe a raw 64-bit hash directly (used by callers that already
    /// have a hash, e.g. a column doing a single pass over raw bytes).
    pub fn add_hash(&mut self, hash: u64) {
        let index = (hash & (NUM_REGISTERS as u64 - 1)) as usize;
        let remainder = hash >> PRECISION;
        // `remainder` only has `64 - PRECISION` significant bits; strip the
        // PRECISION leading zero bits introduced by the shift before
        // counting the real leading-zero run.
        let zeros = remainder.leading_zeros() - PRECISION + 1;
        let zeros = u8::try_from(zeros).unwrap_or(u8::MAX);
        let slot = &mut self.registers[index];
        if zeros > *slot {
            *slot = zeros;
        }
    }

    /// Estimate the number of distinct values observed so far.
    #[must_use]
    pub fn estimate(&self) -> f64 {
        let m = NUM_REGISTERS as f64;
        let sum_inv: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-i32::from(r)))
            .sum();
        let raw = ALPHA * m * m / sum_inv;

        if raw <= 2.5 * m {
            let zero_registers = self.registers.iter().filter(|&&r| r == 0).count();
            if zero_registers > 0 {
                return m * (m / zero_registers as f64).ln();
            }
            return raw;
        }

        if raw > TWO_POW_32 / 30.0 {
            return -TWO_POW_32 * (1.0 - raw / TWO_POW_32).ln();
        }

        raw
    }

    /// Merge another sketch into this one by taking the element-wise
    /// maximum of registers. Both sketches must share precision (enforced
    /// by the type — there is only one `NUM_REGISTERS`).
    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
        trace!(estimate = self.estimate(), "hll merged");
    }

    /// Raw register contents, used by `grizzly-persist` to checkpoint a
    /// sketch mid-scan (see `estimateCardinality`'s `length >= 100_000`
    /// checkpoint-every-10k-rows path).
    #[must_use]
    pub fn registers(&self) -> &[u8; NUM_REGISTERS] {
        &self.registers
    }

    /// Rebuild a sketch from previously checkpointed registers.
    #[must_use]
    pub fn from_registers(registers: [u8; NUM_REGISTERS]) -> Self {
        Self {
            registers: Box::new(registers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sketch_estimates_zero() {
        let hll = HyperLogLog::new();
        assert!(hll.estimate() < 1.0);
    }

    #[test]
    fn merge_is_elementwise_max() {
        let mut a = HyperLogLog::new();
        let mut b = HyperLogLog::new();
        a.add_hash(0x0000_0000_0000_0001);
        b.add_hash(0x0000_0000_0000_0002);
        let before_a = a.registers().to_vec();
        a.merge(&b);
        // Every register in the merged sketch is >= its pre-merge value.
        for (before, after) in before_a.iter().zip(a.registers().iter()) {
            assert!(after >= before);
        }
    }

    #[test]
    fn accuracy_within_two_percent_for_moderate_cardinality() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut hll = HyperLogLog::new();
        let n: u64 = 100_000;
        let mut seen = std::collections::HashSet::with_capacity(n as usize);
        while seen.len() < n as usize {
            let v: u64 = rng.r#gen();
            if seen.insert(v) {
                hll.add_hash(v);
            }
        }
        let estimate = hll.estimate();
        let error = (estimate - n as f64).abs() / n as f64;
        assert!(error <= 0.02, "error {error} exceeds 2% (estimate={estimate}, n={n})");
    }

    #[test]
    fn registers_roundtrip_through_checkpoint() {
        let mut hll = HyperLogLog::new();
        for i in 0..1000_u64 {
            hll.add_hash(i);
        }
        let snapshot = *hll.registers();
        let restored = HyperLogLog::from_registers(snapshot);
        assert_eq!(hll.estimate(), restored.estimate());
    }
}
