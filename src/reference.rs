//! Reference generation for catalog entries

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Trait for producing blob references
///
/// Implementations can draw from:
/// - A pseudo-random generator (`RandomHexSource`, the default)
/// - A scripted list, for deterministic tests (`SequenceSource`)
///
/// References are never derived from blob content; two blobs with the same
/// bytes get distinct references.
pub trait ReferenceSource: Send {
    /// Produce a reference of `2 * byte_length` lowercase hex characters
    fn generate(&mut self, byte_length: usize) -> String;
}

/// The default reference source: a small PRNG seeded from the wall clock
///
/// Fast and well distributed, but not cryptographically strong. References
/// are identifiers, not secrets.
pub struct RandomHexSource {
    rng: SmallRng,
}

impl RandomHexSource {
    /// Create a source seeded from the current time
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        RandomHexSource {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomHexSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceSource for RandomHexSource {
    fn generate(&mut self, byte_length: usize) -> String {
        let mut bytes = vec![0u8; byte_length];
        self.rng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// A reference source that replays a scripted sequence
///
/// Useful for tests that need stable references or want to force duplicate
/// ones. Panics when drawn past the end of its script.
pub struct SequenceSource {
    references: Vec<String>,
    next: usize,
}

impl SequenceSource {
    /// Create a source that yields the given references in order
    pub fn new<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SequenceSource {
            references: references.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl ReferenceSource for SequenceSource {
    fn generate(&mut self, _byte_length: usize) -> String {
        let reference = self
            .references
            .get(self.next)
            .expect("SequenceSource exhausted")
            .clone();
        self.next += 1;
        reference
    }
}
