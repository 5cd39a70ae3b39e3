//! Block based binary delta, in the style of rsync.
//!
//! The holder of the old version computes a [`Signature`]: per fixed size
//! block, a cheap rolling checksum and a truncated SHA-256. The holder of
//! the new version scans it with a rolling window and produces a [`Delta`]
//! made of block copies and literal bytes. The delta size follows how much
//! the two versions diverge, not the file size.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

const STRONG_HASH_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error("block size must be positive")]
    InvalidBlockSize,
    #[error("malformed encoding: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("delta references block {0} outside the base")]
    BlockOutOfRange(u64),
    #[error("reconstructed {actual} bytes, expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BlockSignature {
    weak: u32,
    strong: [u8; STRONG_HASH_LEN],
}

/// Fingerprint of a base version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    block_size: u32,
    base_len: u64,
    blocks: Vec<BlockSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum DeltaOp {
    /// Copy `count` consecutive blocks starting at `start` from the base.
    Copy { start: u32, count: u32 },
    Literal(Vec<u8>),
}

/// Instructions turning a base version into a target version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    target_len: u64,
    ops: Vec<DeltaOp>,
}

/// rsync weak checksum, rolled one byte at a time.
struct Rolling {
    a: u32,
    b: u32,
    len: u32,
}

impl Rolling {
    fn new(window: &[u8]) -> Self {
        let len = window.len() as u32;
        let mut a = 0u32;
        let mut b = 0u32;
        for (i, byte) in window.iter().enumerate() {
            a = a.wrapping_add(*byte as u32);
            b = b.wrapping_add((len - i as u32).wrapping_mul(*byte as u32));
        }
        Self { a, b, len }
    }

    fn roll(&mut self, out: u8, incoming: u8) {
        self.a = self.a.wrapping_sub(out as u32).wrapping_add(incoming as u32);
        self.b = self
            .b
            .wrapping_sub(self.len.wrapping_mul(out as u32))
            .wrapping_add(self.a);
    }

    fn digest(&self) -> u32 {
        (self.a & 0xffff) | ((self.b & 0xffff) << 16)
    }
}

fn strong_hash(block: &[u8]) -> [u8; STRONG_HASH_LEN] {
    let digest = Sha256::digest(block);
    let mut out = [0u8; STRONG_HASH_LEN];
    out.copy_from_slice(&digest[..STRONG_HASH_LEN]);
    out
}

impl Signature {
    pub fn calculate(base: &[u8]) -> Self {
        // DEFAULT_BLOCK_SIZE is non-zero
        Self::with_block_size(base, DEFAULT_BLOCK_SIZE).unwrap_or_else(|_| Self {
            block_size: DEFAULT_BLOCK_SIZE as u32,
            base_len: 0,
            blocks: Vec::new(),
        })
    }

    pub fn with_block_size(base: &[u8], block_size: usize) -> Result<Self, DeltaError> {
        if block_size == 0 || block_size > u32::MAX as usize {
            return Err(DeltaError::InvalidBlockSize);
        }
        let blocks = base
            .chunks(block_size)
            .map(|block| BlockSignature {
                weak: Rolling::new(block).digest(),
                strong: strong_hash(block),
            })
            .collect();
        Ok(Self {
            block_size: block_size as u32,
            base_len: base.len() as u64,
            blocks,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeltaError> {
        let signature: Signature = bincode::deserialize(bytes)?;
        if signature.block_size == 0 {
            return Err(DeltaError::InvalidBlockSize);
        }
        Ok(signature)
    }

    fn block_len(&self, index: usize) -> usize {
        let block_size = self.block_size as u64;
        let start = index as u64 * block_size;
        self.base_len.saturating_sub(start).min(block_size) as usize
    }

    /// Compute the delta that turns the signed base into `target`.
    pub fn diff(&self, target: &[u8]) -> Delta {
        let block_size = self.block_size as usize;

        let mut index: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if self.block_len(i) == block_size {
                index.entry(block.weak).or_default().push(i);
            }
        }

        let mut builder = DeltaBuilder::default();
        let mut pos = 0usize;
        let mut rolling = (target.len() >= block_size).then(|| Rolling::new(&target[..block_size]));

        while pos + block_size <= target.len() {
            let Some(window_sum) = rolling.as_mut() else {
                break;
            };
            let window = &target[pos..pos + block_size];
            let matched = index.get(&window_sum.digest()).and_then(|candidates| {
                let strong = strong_hash(window);
                candidates
                    .iter()
                    .copied()
                    .find(|&i| self.blocks[i].strong == strong)
            });

            if let Some(block) = matched {
                builder.copy(block as u32);
                pos += block_size;
                if pos + block_size <= target.len() {
                    *window_sum = Rolling::new(&target[pos..pos + block_size]);
                }
                continue;
            }

            builder.literal(target[pos]);
            if pos + block_size < target.len() {
                window_sum.roll(target[pos], target[pos + block_size]);
            }
            pos += 1;
        }

        // the base's short final block can only match the target's tail
        let tail = &target[pos..];
        if !tail.is_empty() {
            let last = self.blocks.len().checked_sub(1);
            let tail_match = last.filter(|&i| {
                self.block_len(i) == tail.len() && self.blocks[i].strong == strong_hash(tail)
            });
            match tail_match {
                Some(block) => builder.copy(block as u32),
                None => builder.literals(tail),
            }
        }

        builder.finish(target.len() as u64)
    }
}

#[derive(Default)]
struct DeltaBuilder {
    ops: Vec<DeltaOp>,
    pending: Vec<u8>,
}

impl DeltaBuilder {
    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.ops
                .push(DeltaOp::Literal(std::mem::take(&mut self.pending)));
        }
    }

    fn copy(&mut self, block: u32) {
        self.flush();
        if let Some(DeltaOp::Copy { start, count }) = self.ops.last_mut() {
            if *start + *count == block {
                *count += 1;
                return;
            }
        }
        self.ops.push(DeltaOp::Copy {
            start: block,
            count: 1,
        });
    }

    fn literal(&mut self, byte: u8) {
        self.pending.push(byte);
    }

    fn literals(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn finish(mut self, target_len: u64) -> Delta {
        self.flush();
        Delta {
            target_len,
            ops: self.ops,
        }
    }
}

impl Delta {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeltaError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Bytes carried literally, a rough measure of divergence.
    pub fn literal_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Literal(bytes) => bytes.len(),
                DeltaOp::Copy { .. } => 0,
            })
            .sum()
    }

    /// Reconstruct the target from `base`. The block size must match the
    /// one of the signature the delta was computed against.
    pub fn apply(&self, base: &[u8], block_size: usize) -> Result<Vec<u8>, DeltaError> {
        if block_size == 0 {
            return Err(DeltaError::InvalidBlockSize);
        }
        let mut out = Vec::with_capacity(self.target_len.min(64 * 1024 * 1024) as usize);
        for op in &self.ops {
            match op {
                DeltaOp::Literal(bytes) => out.extend_from_slice(bytes),
                DeltaOp::Copy { start, count } => {
                    for block in *start as u64..*start as u64 + *count as u64 {
                        let begin = block * block_size as u64;
                        if begin >= base.len() as u64 {
                            return Err(DeltaError::BlockOutOfRange(block));
                        }
                        let end = (begin + block_size as u64).min(base.len() as u64);
                        out.extend_from_slice(&base[begin as usize..end as usize]);
                    }
                }
            }
        }
        if out.len() as u64 != self.target_len {
            return Err(DeltaError::LengthMismatch {
                expected: self.target_len,
                actual: out.len() as u64,
            });
        }
        Ok(out)
    }
}

/// Server side of a pull: diff the current content against a client's
/// encoded signature, returning the encoded delta.
pub fn diff(signature: &[u8], target: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let signature = Signature::from_bytes(signature)?;
    Ok(signature.diff(target).to_bytes())
}

/// Apply an encoded delta produced against `signature(base)` with the
/// default block size.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    Delta::from_bytes(delta)?.apply(base, DEFAULT_BLOCK_SIZE)
}

/// Encoded signature of `base` with the default block size.
pub fn signature(base: &[u8]) -> Vec<u8> {
    Signature::calculate(base).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    fn round_trip(base: &[u8], target: &[u8]) -> Delta {
        let encoded = diff(&signature(base), target).unwrap();
        assert_eq!(apply(base, &encoded).unwrap(), target);
        Delta::from_bytes(&encoded).unwrap()
    }

    #[test]
    fn test_round_trip_edge_cases() {
        round_trip(b"", b"");
        round_trip(b"", b"new content");
        round_trip(b"old content", b"");
        round_trip(b"same", b"same");
    }

    #[test]
    fn test_rolling_matches_fresh_checksum() {
        let data = pseudo_random(64, 7);
        let mut rolling = Rolling::new(&data[0..16]);
        for start in 1..=48 {
            rolling.roll(data[start - 1], data[start + 15]);
            assert_eq!(rolling.digest(), Rolling::new(&data[start..start + 16]).digest());
        }
    }

    #[test]
    fn test_small_edit_yields_small_delta() {
        let base = pseudo_random(DEFAULT_BLOCK_SIZE * 16 + 123, 1);
        let mut target = base.clone();
        target.splice(5000..5000, b"inserted bytes".iter().copied());
        target[40_000] ^= 0xff;

        let delta = round_trip(&base, &target);
        assert!(delta.literal_len() < DEFAULT_BLOCK_SIZE * 3);
    }

    #[test]
    fn test_unaligned_tail_is_copied() {
        let base = pseudo_random(DEFAULT_BLOCK_SIZE * 2 + 10, 3);
        let mut target = b"prefix".to_vec();
        target.extend_from_slice(&base);

        let delta = round_trip(&base, &target);
        assert_eq!(delta.literal_len(), 6);
    }

    #[test]
    fn test_arbitrary_binary() {
        for seed in 0..8u64 {
            let base = pseudo_random(1000 + seed as usize * 997, seed);
            let target = pseudo_random(800 + seed as usize * 1301, seed + 100);
            round_trip(&base, &target);
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Signature::from_bytes(b"\x00").is_err());
        let delta = Delta {
            target_len: 4,
            ops: vec![DeltaOp::Copy { start: 9, count: 1 }],
        };
        assert!(matches!(
            delta.apply(b"abcd", 4),
            Err(DeltaError::BlockOutOfRange(9))
        ));
        assert!(matches!(
            Signature::with_block_size(b"x", 0),
            Err(DeltaError::InvalidBlockSize)
        ));
    }
}
