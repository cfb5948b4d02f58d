// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

/// Generates engine-local ids.
///
/// One counter is shared by every prefix, so ids never repeat within an
/// engine even across kinds.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `{prefix}{n}` for the next `n`.
    pub fn next(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}{}", prefix, self.counter)
    }

    /// Like [`IdGenerator::next`], skipping ids for which `taken` is true.
    pub fn next_unused<F>(&mut self, prefix: &str, taken: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        loop {
            let id = self.next(prefix);
            if !taken(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
