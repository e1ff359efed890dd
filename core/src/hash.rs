//! Slot index derivation for membership filters

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How the `k` slot indices of a key are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashKind {
    /// One independent md5 digest per hash index
    Simple,
    /// `h1 + i*h2` over a single sha256 digest
    Double,
    /// `h1 + i*h2 + i^2*h3` over a single sha256 digest
    Triple,
}

impl HashKind {
    /// Slot indices in `[0, size)` for `key`, one per hash function
    pub fn indices(&self, key: &[u8], hash_count: u32, size: usize) -> Vec<usize> {
        debug_assert!(size > 0);
        let m = size as u64;

        match self {
            Self::Simple => (0..hash_count)
                .map(|i| {
                    let mut input = Vec::with_capacity(4 + key.len());
                    input.extend_from_slice(&i.to_le_bytes());
                    input.extend_from_slice(key);
                    let digest = md5::compute(&input);
                    (word(&digest.0, 0) % m) as usize
                })
                .collect(),
            Self::Double | Self::Triple => {
                let digest = Sha256::digest(key);
                let h1 = word(&digest, 0);
                // Odd step so consecutive indices never collapse onto one slot
                let h2 = word(&digest, 8) | 1;
                let h3 = if *self == Self::Triple {
                    word(&digest, 16)
                } else {
                    0
                };

                (0..hash_count as u64)
                    .map(|i| {
                        let combined = h1
                            .wrapping_add(i.wrapping_mul(h2))
                            .wrapping_add(i.wrapping_mul(i).wrapping_mul(h3));
                        (combined % m) as usize
                    })
                    .collect()
            }
        }
    }
}

fn word(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_deterministic_and_bounded() {
        for kind in [HashKind::Simple, HashKind::Double, HashKind::Triple] {
            let first = kind.indices(b"peer-1", 7, 101);
            let second = kind.indices(b"peer-1", 7, 101);
            assert_eq!(first, second);
            assert_eq!(first.len(), 7);
            assert!(first.iter().all(|i| *i < 101));
        }
    }

    #[test]
    fn test_kinds_differ() {
        let simple = HashKind::Simple.indices(b"peer-1", 4, 1 << 20);
        let double = HashKind::Double.indices(b"peer-1", 4, 1 << 20);
        assert_ne!(simple, double);
    }
}
