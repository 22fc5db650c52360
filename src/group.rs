use {
    crate::intention::Intention,
    parking_lot::{Condvar, Mutex},
    std::{
        cell::Cell,
        sync::atomic::{
            AtomicUsize,
            Ordering::{AcqRel, Acquire, Relaxed},
        },
    },
};


// A batch stops accepting merges once this many callers are in it; by then
// the merged fingerprints are dense enough that further merges would
// mostly be refused anyway.
const GROUP_MERGE_CAP: usize = 8;

/// What a group currently admits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    /// A placeholder tail; no participants, no intention. Admits any
    /// first request at zero cost.
    Vacant,
    /// Global readers and zero-write intentions.
    ReadOnly,
    /// A merged batch of compatible read/write intentions.
    ReadWrite,
    /// A frozen batch; no further merges.
    Exclusive,
    /// A single caller excluding everything behind it.
    GlobalWrite,
}

/// An admission record: a merged batch of requests that proceed
/// concurrently once the record becomes the active head.
///
/// `kind` and `intention` are only read and written while the owning
/// lock's internal mutex is held. `participants` is also decremented by
/// releasing callers outside of that mutex; the zero transition elects
/// the one caller that advances the queue.
pub(crate) struct Group {
    kind: Cell<Kind>,
    intention: Cell<Intention>,
    participants: AtomicUsize,
    gate: Gate,
}

// SAFETY: - kind and intention are Cells, but every access goes through
//           the owning lock's internal mutex (merge, join, clear all
//           require it), so no two threads touch them concurrently.
//         - participants is atomic and the gate is internally
//           synchronized.
unsafe impl Sync for Group {}

impl Group {
    pub(crate) fn new() -> Self {
        Self {
            kind: Cell::new(Kind::Vacant),
            intention: Cell::new(Intention::default()),
            participants: AtomicUsize::new(0),
            gate: Gate::new(),
        }
    }

    pub(crate) fn kind(&self) -> Kind {
        self.kind.get()
    }

    pub(crate) fn participants(&self) -> usize {
        self.participants.load(Relaxed)
    }

    /// Tries to fold an intention into a group that has not been
    /// activated yet. The internal mutex must be held.
    pub(crate) fn merge_request(&self, intention: &Intention) -> bool {
        match self.kind.get() {
            Kind::Vacant => {
                self.kind.set(Kind::ReadWrite);
                self.intention.set(*intention);
                self.participants.store(1, Relaxed);
                true
            }
            Kind::ReadOnly => {
                if intention.min_writes != 0 {
                    return false;
                }
                self.participants.fetch_add(1, Relaxed);
                true
            }
            Kind::ReadWrite => {
                let mut merged = self.intention.get();
                if !merged.merge(intention) {
                    return false;
                }
                self.intention.set(merged);
                let n = self.participants.fetch_add(1, Relaxed) + 1;
                if n > GROUP_MERGE_CAP {
                    self.kind.set(Kind::Exclusive);
                }
                true
            }
            Kind::Exclusive | Kind::GlobalWrite => false,
        }
    }

    /// Tries to join the group as a global reader before activation.
    /// The internal mutex must be held.
    pub(crate) fn global_read_request(&self) -> bool {
        match self.kind.get() {
            Kind::Vacant => {
                self.kind.set(Kind::ReadOnly);
                self.participants.store(1, Relaxed);
                true
            }
            Kind::ReadOnly => {
                self.participants.fetch_add(1, Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Tries to claim the group for a global writer before activation.
    /// The internal mutex must be held.
    pub(crate) fn global_write_request(&self) -> bool {
        match self.kind.get() {
            Kind::Vacant => {
                self.kind.set(Kind::GlobalWrite);
                self.participants.store(1, Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Tries to fold an intention into the group while it is the active
    /// head. The internal mutex must be held.
    ///
    /// The participant slot is reserved by compare-and-swap before any
    /// field is written: a counter already at zero means the last
    /// participant has released and the torch-bearer owns this record
    /// now, so the join is refused and the request falls through to the
    /// pending queue.
    pub(crate) fn try_join_intent(&self, intention: &Intention) -> bool {
        match self.kind.get() {
            Kind::ReadOnly => intention.min_writes == 0 && self.reserve().is_some(),
            Kind::ReadWrite => {
                let mut merged = self.intention.get();
                if !merged.merge(intention) {
                    return false;
                }
                let Some(n) = self.reserve() else {
                    return false;
                };
                self.intention.set(merged);
                if n > GROUP_MERGE_CAP {
                    self.kind.set(Kind::Exclusive);
                }
                true
            }
            Kind::Vacant | Kind::Exclusive | Kind::GlobalWrite => false,
        }
    }

    /// Tries to join the group as a global reader while it is the active
    /// head. The internal mutex must be held.
    pub(crate) fn try_join_read_only(&self) -> bool {
        self.kind.get() == Kind::ReadOnly && self.reserve().is_some()
    }

    /// Reserves one participant slot and returns the new count, unless
    /// the group has already drained to zero.
    fn reserve(&self) -> Option<usize> {
        let mut n = self.participants.load(Acquire);
        loop {
            if n == 0 {
                return None;
            }
            match self
                .participants
                .compare_exchange_weak(n, n + 1, AcqRel, Acquire)
            {
                Ok(_) => return Some(n + 1),
                Err(actual) => n = actual,
            }
        }
    }

    /// Drops one participant. Returns true for exactly one caller per
    /// activation: the torch-bearer that must advance the queue.
    pub(crate) fn release(&self) -> bool {
        self.participants.fetch_sub(1, AcqRel) == 1
    }

    /// Admits the group: opens the gate for all current and future
    /// participants.
    pub(crate) fn activate(&self) {
        self.gate.open();
    }

    /// Blocks until the group is activated. Returns false if the lock
    /// was closed before that happened.
    pub(crate) fn wait(&self) -> bool {
        self.gate.wait()
    }

    /// Wakes residual waiters with the sticky closed flag.
    pub(crate) fn close(&self) {
        self.gate.close();
    }

    /// Resets the record to the vacant placeholder state for reuse. The
    /// internal mutex must be held and the group must have drained.
    pub(crate) fn clear(&self) {
        self.kind.set(Kind::Vacant);
        self.intention.set(Intention::default());
        self.participants.store(0, Relaxed);
        self.gate.reset();
    }
}

/// A group's one-shot admission gate.
struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Default)]
struct GateState {
    open: bool,
    closed: bool,
}

impl Gate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
        }
    }

    fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while !state.open && !state.closed {
            self.cond.wait(&mut state);
        }
        // A gate that was opened before the close still admits: the
        // caller was a participant and must go on to release.
        state.open
    }

    fn open(&self) {
        self.state.lock().open = true;
        self.cond.notify_all();
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }

    fn reset(&self) {
        *self.state.lock() = GateState::default();
    }
}
