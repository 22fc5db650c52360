//! This crate provides [`MultiLock`], a reader/writer lock that covers an
//! arbitrary set of integer-identified resources in a single acquisition.
//!
//! # Motivation
//!
//! With one lock per resource, a caller that needs several resources at
//! once has to take the locks one by one, in a globally agreed order, and
//! pays one contended atomic operation per resource. When the set is
//! large, sparse, or not known until runtime, both the ordering
//! discipline and the per-resource cost become the bottleneck.
//!
//! A [`MultiLock`] takes the whole set in one call instead:
//!
//! ```
//! use bloom_lock::MultiLock;
//!
//! let lock = MultiLock::new();
//! let guard = lock.multilock([1, 7], [9])?;
//! // reads of 1 and 7 and writes of 9 are licensed until the guard drops
//! drop(guard);
//! # Ok::<(), bloom_lock::Closed>(())
//! ```
//!
//! Internally the requested set is summarized by a pair of one-word
//! bloom-filter [`Fingerprint`]s (reads and writes). Requests whose
//! fingerprints do not conflict are merged into a shared admission group
//! and run concurrently; conflicting requests are queued FIFO as separate
//! groups. A hash collision can only ever serialize two requests that
//! would have been safe together, never run two conflicting requests at
//! once, so throughput degrades gracefully while correctness does not
//! depend on hash quality.
//!
//! The cost of an acquisition is a short critical section on one internal
//! mutex plus one wait on the group's gate, independent of how many
//! resources the request names. The internal mutex is pluggable through
//! [`RawMultiLock`]; [`SpinMultiLock`] trades blocking for spinning.
//!
//! Acquisitions are strictly paired with releases on the same thread
//! (guards are `!Send`), and a thread re-acquiring a lock it already
//! holds is rejected with a panic rather than left to deadlock.

pub use {
    fingerprint::{Fingerprint, Key},
    intention::Intention,
    lock::{Closed, Guard, MultiLock, RawMultiLock, SpinMultiLock},
    spin::RawSpinMutex,
};

mod fingerprint;
mod group;
mod intention;
mod lock;
mod spin;
mod tracker;
