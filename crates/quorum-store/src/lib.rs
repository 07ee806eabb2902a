//! # Quorum Store
//!
//! Optimistically-concurrent object storage and the conflict-safe applier
//! every managed write goes through.
//!
//! ## Key Components
//!
//! - [`VersionedStore`]: get returns a [`VersionToken`](quorum_types::VersionToken);
//!   a write carrying a stale token fails with [`StoreError::Conflict`]
//! - [`InMemoryVersionedStore`]: DashMap-backed store for development and tests
//! - [`ConflictSafeApplier`]: re-read, re-merge and retry on conflict with
//!   bounded exponential backoff
//!
//! Exhaustion is reported as [`ApplyError::Exhausted`], which is transient:
//! the next scheduled reconcile starts over from a fresh read.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod applier;
pub mod backoff;
pub mod error;
pub mod store;

pub use applier::{ApplyKind, ApplyOutcome, ConflictSafeApplier};
pub use backoff::{Backoff, BackoffConfig};
pub use error::{ApplyError, ApplyResult, StoreError, StoreResult};
pub use store::{InMemoryVersionedStore, VersionedStore};
