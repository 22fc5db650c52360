use {
    crate::{
        fingerprint::{Fingerprint, Key},
        intention::Intention,
    },
    proptest::prelude::*,
};

fn intent(reads: u64, writes: u64, min_writes: u32) -> Intention {
    Intention {
        reads: Fingerprint(reads),
        writes: Fingerprint(writes),
        min_writes,
    }
}

#[test]
fn compatibility() {
    let writer = intent(0, 1 << 0, 1);
    assert!(!writer.compatible(&intent(1 << 0, 0, 0)), "write vs read");
    assert!(!writer.compatible(&intent(0, 1 << 0, 1)), "write vs write");
    assert!(writer.compatible(&intent(1 << 1, 1 << 2, 1)), "disjoint");
    // Overlapping reads never conflict.
    let reader = intent(1 << 3, 0, 0);
    assert!(reader.compatible(&intent(1 << 3, 0, 0)));
}

#[test]
fn merge_widens_and_adds_write_counts() {
    let mut a = intent(1 << 0, 1 << 1, 1);
    let b = intent(1 << 2, 1 << 3, 2);
    assert!(a.merge(&b));
    assert_eq!(a, intent((1 << 0) | (1 << 2), (1 << 1) | (1 << 3), 3));
}

#[test]
fn merge_refuses_conflicts_untouched() {
    let mut a = intent(1 << 0, 1 << 1, 1);
    let before = a;
    assert!(!a.merge(&intent(1 << 1, 0, 0)));
    assert_eq!(a, before);
}

#[test]
fn merge_refuses_oversized_write_sets() {
    let mut a = intent(1 << 0, 1 << 1, 1);
    // Disjoint, but carrying too many writes to be worth batching.
    assert!(!a.merge(&intent(0, 1 << 60, 9)));
    assert!(a.merge(&intent(0, 1 << 60, 8)));
}

#[test]
fn identity() {
    let identity = Intention::default();
    assert!(identity.compatible(&identity));
    assert!(identity.compatible(&intent(!0, !0, 1)));
    let mut a = intent(1 << 4, 1 << 5, 1);
    let before = a;
    assert!(a.merge(&identity));
    assert_eq!(a, before);
}

#[test]
fn constructors() {
    let read = Intention::read(5);
    assert_eq!(read.min_writes, 0);
    assert!(read.reads.maybe_contains(5));
    assert!(read.writes.is_empty());

    let write = Intention::write(5);
    assert_eq!(write.min_writes, 1);
    assert!(write.reads.maybe_contains(5));
    assert!(write.writes.maybe_contains(5));

    let multi = Intention::new([1, 2], [3]);
    assert_eq!(multi.min_writes, 1);
    assert!(multi.reads.maybe_contains(1));
    assert!(multi.reads.maybe_contains(2));
    assert!(multi.writes.maybe_contains(3));
}

#[test]
fn reserved_key_is_ignored() {
    assert_eq!(Intention::new([0], [0]), Intention::default());
    let read = Intention::new([7], [0]);
    assert_eq!(read.min_writes, 0);
    assert!(read.writes.is_empty());
}

#[test]
fn disjoint_small_keys_merge() {
    // Keys 1..=4 hash to pairwise distinct bit positions, so the two
    // intentions of the classic disjoint-writer pair really do merge.
    let mut a = Intention::new([1], [2]);
    let b = Intention::new([3], [4]);
    assert!(a.compatible(&b));
    assert!(a.merge(&b));
    assert_eq!(a.min_writes, 2);
}

fn keys() -> impl Strategy<Value = Vec<Key>> {
    prop::collection::vec(1u32..=u32::MAX, 0..6)
}

proptest! {
    #[test]
    fn merge_is_conservative(ra in keys(), wa in keys(), rb in keys(), wb in keys()) {
        let a = Intention::new(ra, wa);
        let b = Intention::new(rb, wb);
        prop_assert_eq!(a.compatible(&b), b.compatible(&a));
        let mut merged = a;
        if merged.merge(&b) {
            prop_assert!(a.compatible(&b));
            // Widening only: every bit of both inputs survives the merge.
            prop_assert_eq!(merged.reads.0 & a.reads.0, a.reads.0);
            prop_assert_eq!(merged.reads.0 & b.reads.0, b.reads.0);
            prop_assert_eq!(merged.writes.0 & a.writes.0, a.writes.0);
            prop_assert_eq!(merged.writes.0 & b.writes.0, b.writes.0);
            prop_assert_eq!(merged.min_writes, a.min_writes + b.min_writes);
        } else {
            prop_assert!(!a.compatible(&b) || b.min_writes > 8);
        }
    }
}
