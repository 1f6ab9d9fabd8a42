//! Collection of policy violations.
//!
//! Scanners run in parallel and append to one shared [`Violations`] container. It uses
//! `boxcar::Vec` internally, which supports lock-free concurrent appends, so no scanner has to
//! coordinate with another. Emission order carries no meaning; [`Violations::sorted`] gives the
//! deterministic order used for reporting.

use std::fmt;

use serde::Serialize;

/// A policy violation found in the scanned assembly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SandboxError {
    /// Human-readable description of the violation
    pub message: String,
}

impl SandboxError {
    /// Creates a new violation.
    pub fn new(message: impl Into<String>) -> Self {
        SandboxError {
            message: message.into(),
        }
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Thread-safe, append-only container of [`SandboxError`]s.
#[derive(Debug)]
pub struct Violations {
    entries: boxcar::Vec<SandboxError>,
}

impl Default for Violations {
    fn default() -> Self {
        Self::new()
    }
}

impl Violations {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Record a violation.
    pub fn push(&self, message: impl Into<String>) {
        self.entries.push(SandboxError::new(message));
    }

    /// Number of violations recorded so far
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns an iterator over the violations, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &SandboxError> {
        self.entries.iter().map(|(_, violation)| violation)
    }

    /// All violations, sorted by message.
    pub fn sorted(&self) -> Vec<SandboxError> {
        let mut violations: Vec<SandboxError> = self.iter().cloned().collect();
        violations.sort();
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_push() {
        let violations = Violations::new();
        (0..1000).into_par_iter().for_each(|index| {
            violations.push(format!("violation {index:04}"));
        });

        assert_eq!(violations.count(), 1000);
        let sorted = violations.sorted();
        assert_eq!(sorted[0].message, "violation 0000");
        assert_eq!(sorted[999].message, "violation 0999");
    }
}
