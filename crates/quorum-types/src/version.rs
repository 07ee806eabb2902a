//! Optimistic-concurrency version stamps

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque optimistic-concurrency stamp attached to every stored object.
///
/// A write carrying a token that no longer matches the stored object is
/// rejected; the writer must re-read and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionToken(u64);

impl VersionToken {
    /// Token assigned to a freshly created object
    pub const INITIAL: Self = Self(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Token the store assigns after a successful write
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A stored value together with the token it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: VersionToken,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: VersionToken) -> Self {
        Self { value, version }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
