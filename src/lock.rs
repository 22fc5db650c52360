use {
    crate::{
        fingerprint::Key,
        group::{Group, Kind},
        intention::Intention,
        spin::RawSpinMutex,
        tracker,
    },
    parking_lot::lock_api::RawMutex as RawMutexTrait,
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        cell::UnsafeCell,
        collections::VecDeque,
        fmt::{Debug, Formatter},
        marker::PhantomData,
        sync::Arc,
    },
    thiserror::Error,
};


// Steady-state sizing: seven pooled records plus the queue placeholder.
const POOLED_GROUPS: usize = 7;

/// Error returned by acquisitions that race with [`RawMultiLock::close`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("the multilock is closed")]
pub struct Closed;

/// A multi-resource reader/writer lock.
///
/// One acquisition covers an arbitrary set of resource [`Key`]s, read and
/// write sides requested together. The access set is summarized by a pair
/// of bloom-filter [`Fingerprint`](crate::Fingerprint)s; compatible
/// requests are batched into one admission group and proceed concurrently,
/// while conflicting requests are sequenced FIFO behind the batch.
///
/// Fingerprint collisions only ever serialize requests that could have
/// run together; they never admit a conflicting pair.
///
/// `R` is the mutex guarding the short internal critical sections. The
/// default is [`parking_lot::RawMutex`]; [`SpinMultiLock`] spins instead,
/// which is the better fit when contention is low and the machine is not
/// oversubscribed.
///
/// # Example
///
/// ```
/// use bloom_lock::MultiLock;
///
/// let lock = MultiLock::new();
/// let guard = lock.multilock([1, 7], [9]).unwrap();
/// // reads of 1 and 7 and writes of 9 are now licensed
/// drop(guard);
///
/// let guard = lock.global_write_lock().unwrap();
/// // everything is excluded until this guard drops
/// drop(guard);
/// ```
///
/// # Re-entrance
///
/// A thread acquiring a lock it already holds would deadlock against its
/// own admission group, so every acquisition is checked against a
/// thread-local set of held locks and a recursive acquisition panics.
pub struct RawMultiLock<R: RawMutexTrait = parking_lot::RawMutex> {
    mutex: R,
    inner: UnsafeCell<Inner>,
}

/// The default multilock, blocking on [`parking_lot::RawMutex`]
/// internally.
pub type MultiLock = RawMultiLock<parking_lot::RawMutex>;

/// A multilock that spins for its internal critical sections.
pub type SpinMultiLock = RawMultiLock<RawSpinMutex>;

// SAFETY: - inner is only accessed while mutex is held, so sharing
//           &RawMultiLock is sound: every mutation of the queue, the
//           pool, the active slot and the group records is serialized.
//         - The Groups handed out of the critical section are Sync with
//           their own invariants (see group.rs).
unsafe impl<R: RawMutexTrait + Sync> Sync for RawMultiLock<R> {}

assert_impl_all!(MultiLock: Send, Sync);
assert_impl_all!(SpinMultiLock: Send, Sync);

struct Inner {
    /// The currently admitted group, if any. Only touched under the
    /// mutex; participants find their group through their guard instead.
    active: Option<Arc<Group>>,
    /// Pending admission groups, FIFO. Never empty until close: the
    /// front is the batch that activates next (a vacant placeholder
    /// admits any first request), and every drain re-pushes a cleared
    /// record as the placeholder.
    queue: VecDeque<Arc<Group>>,
    /// Freelist of cleared records.
    pool: Vec<Arc<Group>>,
    closing: bool,
}

impl Inner {
    fn allocate(&mut self) -> Arc<Group> {
        self.pool.pop().unwrap_or_else(|| Arc::new(Group::new()))
    }

    /// Pops the queue front into the active slot and admits it. The
    /// caller restores the never-empty invariant afterwards.
    fn promote_front(&mut self) {
        let group = self
            .queue
            .pop_front()
            .expect("admission queue is never empty");
        group.activate();
        self.active = Some(group);
    }
}

/// What one acquisition asks of the admission engine.
enum Request {
    Intent(Intention),
    GlobalRead,
    GlobalWrite,
}

/// An acquired multilock, released on drop.
///
/// The guard is neither [`Send`] nor [`Sync`]: the release must happen on
/// the acquiring thread, which is also where the held-lock tracking
/// lives.
pub struct Guard<'a, R: RawMutexTrait = parking_lot::RawMutex> {
    lock: &'a RawMultiLock<R>,
    group: Arc<Group>,
    _not_send: PhantomData<*const ()>,
}

assert_not_impl_any!(Guard<'_>: Send, Sync);

impl<R: RawMutexTrait> RawMultiLock<R> {
    /// Creates an idle lock.
    pub fn new() -> Self {
        let mut queue = VecDeque::with_capacity(POOLED_GROUPS + 1);
        queue.push_back(Arc::new(Group::new()));
        let pool = (0..POOLED_GROUPS).map(|_| Arc::new(Group::new())).collect();
        Self {
            mutex: R::INIT,
            inner: UnsafeCell::new(Inner {
                active: None,
                queue,
                pool,
                closing: false,
            }),
        }
    }

    /// Runs `f` under the internal mutex.
    ///
    /// `f` must not block and must not re-enter the lock.
    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        self.mutex.lock();
        // SAFETY: - inner is only ever dereferenced in this function.
        //         - We hold the mutex, so no other &mut Inner exists.
        let result = f(unsafe { &mut *self.inner.get() });
        // SAFETY: - Locked a few lines up by this thread.
        unsafe {
            self.mutex.unlock();
        }
        result
    }

    /// The identity used by the per-thread held-lock tracking. Stable
    /// while any guard borrows the lock.
    fn id(&self) -> usize {
        self as *const Self as *const u8 as usize
    }

    /// Acquires read access to one resource.
    pub fn read_lock(&self, key: Key) -> Result<Guard<'_, R>, Closed> {
        self.acquire(Request::Intent(Intention::read(key)))
    }

    /// Acquires write access to one resource.
    pub fn write_lock(&self, key: Key) -> Result<Guard<'_, R>, Closed> {
        self.acquire(Request::Intent(Intention::write(key)))
    }

    /// Acquires read access to `reads` and write access to `writes`, all
    /// at once.
    ///
    /// # Example
    ///
    /// ```
    /// use bloom_lock::MultiLock;
    ///
    /// let lock = MultiLock::new();
    /// let _guard = lock.multilock([1, 2, 3], [4]).unwrap();
    /// ```
    pub fn multilock<I, J>(&self, reads: I, writes: J) -> Result<Guard<'_, R>, Closed>
    where
        I: IntoIterator<Item = Key>,
        J: IntoIterator<Item = Key>,
    {
        self.lock_intention(Intention::new(reads, writes))
    }

    /// Acquires a prebuilt [`Intention`].
    ///
    /// Useful when the same access set is locked in a loop: the
    /// fingerprints are hashed once and reused.
    pub fn lock_intention(&self, intention: Intention) -> Result<Guard<'_, R>, Closed> {
        self.acquire(Request::Intent(intention))
    }

    /// Joins the shared all-readers class.
    ///
    /// Global reads coexist with every zero-write acquisition and merge
    /// aggressively: into the admitted head when it is read-only, and
    /// into a read-only tail batch otherwise.
    pub fn global_read_lock(&self) -> Result<Guard<'_, R>, Closed> {
        self.acquire(Request::GlobalRead)
    }

    /// Acquires exclusive access to everything.
    pub fn global_write_lock(&self) -> Result<Guard<'_, R>, Closed> {
        self.acquire(Request::GlobalWrite)
    }

    fn acquire(&self, request: Request) -> Result<Guard<'_, R>, Closed> {
        tracker::track(self.id());
        let group = match self.admit(&request) {
            Ok(group) => group,
            Err(Closed) => {
                tracker::untrack(self.id());
                return Err(Closed);
            }
        };
        // The wait happens outside the internal mutex. Joining an active
        // head finds the gate already open and returns immediately.
        if !group.wait() {
            tracker::untrack(self.id());
            return Err(Closed);
        }
        Ok(Guard {
            lock: self,
            group,
            _not_send: PhantomData,
        })
    }

    /// Decides where the request is admitted and counts it into that
    /// group. The caller then waits on the returned group's gate.
    fn admit(&self, request: &Request) -> Result<Arc<Group>, Closed> {
        self.with_inner(|inner| {
            if inner.closing {
                return Err(Closed);
            }

            // Join the admitted head if the request is compatible with
            // everything already running. Requests that arrived earlier
            // but conflicted stay queued; overtaking them here is the
            // intended throughput trade.
            if let Some(active) = &inner.active {
                if Self::try_join_active(active, request) {
                    return Ok(active.clone());
                }
            }

            // Merge into the batch accumulating at the queue front. A
            // vacant placeholder admits any first request, so this always
            // succeeds on an idle lock; the front is then promoted since
            // nothing else would activate it.
            let front = inner.queue.front().expect("admission queue is never empty");
            if Self::try_merge(front, request) {
                let group = front.clone();
                if inner.active.is_none() {
                    inner.promote_front();
                    if inner.queue.is_empty() {
                        let placeholder = inner.allocate();
                        inner.queue.push_back(placeholder);
                    }
                }
                return Ok(group);
            }

            // Global reads may also join the tail batch: a global read
            // commutes with any future global read, so no extra
            // compatibility tracking is needed. General requests never
            // tail-merge.
            if matches!(request, Request::GlobalRead) && inner.queue.len() > 1 {
                let back = inner.queue.back().expect("admission queue is never empty");
                if back.global_read_request() {
                    return Ok(back.clone());
                }
            }

            // Sequence behind everything: a fresh group at the tail.
            let group = inner.allocate();
            let merged = Self::try_merge(&group, request);
            debug_assert!(merged, "a vacant group admits any request");
            inner.queue.push_back(group.clone());
            Ok(group)
        })
    }

    fn try_merge(group: &Arc<Group>, request: &Request) -> bool {
        match request {
            Request::Intent(intention) => group.merge_request(intention),
            Request::GlobalRead => group.global_read_request(),
            Request::GlobalWrite => group.global_write_request(),
        }
    }

    fn try_join_active(active: &Arc<Group>, request: &Request) -> bool {
        match request {
            Request::Intent(intention) => active.try_join_intent(intention),
            Request::GlobalRead => active.try_join_read_only(),
            // A global write never shares a group.
            Request::GlobalWrite => false,
        }
    }

    /// Releases one acquisition. The caller whose release drains the
    /// group is the torch-bearer: it retires the old head, activates the
    /// next batch, and recycles the record.
    fn release(&self, group: &Arc<Group>) {
        tracker::untrack(self.id());
        if !group.release() {
            return;
        }
        self.with_inner(|inner| {
            if inner.closing {
                // close() already tore the queue down; the record is
                // freed when its last Arc drops.
                return;
            }
            let old = inner
                .active
                .take()
                .expect("the active group outlives its last participant");
            debug_assert!(Arc::ptr_eq(&old, group));
            // No later caller can reach the record: joins refuse a
            // drained counter and the active slot is empty now.
            old.clear();
            let front = inner.queue.front().expect("admission queue is never empty");
            if front.kind() != Kind::Vacant {
                inner.promote_front();
            }
            if inner.queue.is_empty() {
                // The cleared record takes over as the placeholder tail.
                inner.queue.push_back(old);
            } else {
                inner.pool.push(old);
            }
        });
    }

    /// Closes the lock: residual and future acquisitions fail with
    /// [`Closed`], and waiters parked on pending groups wake up.
    ///
    /// Idempotent. Dropping the lock closes it as well.
    pub fn close(&self) {
        self.with_inner(|inner| {
            if inner.closing {
                return;
            }
            inner.closing = true;
            if let Some(active) = inner.active.take() {
                active.close();
            }
            for group in inner.queue.drain(..) {
                group.close();
            }
            inner.pool.clear();
        });
    }

    /// Returns whether [`RawMultiLock::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.with_inner(|inner| inner.closing)
    }
}

impl<R: RawMutexTrait> Default for RawMultiLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RawMutexTrait> Drop for RawMultiLock<R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<R: RawMutexTrait> Debug for RawMultiLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLock")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

impl<R: RawMutexTrait> Drop for Guard<'_, R> {
    fn drop(&mut self) {
        self.lock.release(&self.group);
    }
}

impl<R: RawMutexTrait> Debug for Guard<'_, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("lock_id", &self.lock.id())
            .finish_non_exhaustive()
    }
}
