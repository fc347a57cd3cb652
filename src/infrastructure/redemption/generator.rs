//! Redemption code generation
//!
//! Draws codes from the unambiguous alphabet and formats them in hyphenated groups.

use rand::Rng;

use crate::domain::redemption::CODE_ALPHABET;

/// Generator for random redemption codes
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    /// Random characters per code, hyphens excluded
    length: usize,
    /// Characters per hyphen-separated group
    group_size: usize,
}

impl CodeGenerator {
    /// Create a generator for `length` random characters
    pub fn new(length: usize) -> Self {
        Self {
            length,
            group_size: 4,
        }
    }

    /// Set the group size; zero disables grouping
    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    /// Generate a new code
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let raw: Vec<char> = (0..self.length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();

        if self.group_size == 0 {
            return raw.into_iter().collect();
        }

        raw.chunks(self.group_size)
            .map(|group| group.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(16)
    }
}
