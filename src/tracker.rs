use std::cell::RefCell;


thread_local! {
    // The locks this thread currently holds, by identity. A thread
    // realistically holds a handful of locks at once, so a linear scan
    // over a Vec is O(1) in practice.
    static HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Registers `lock` as held by the current thread.
///
/// # Panics
///
/// Panics if the thread already holds it: acquiring a lock the thread is
/// inside of would deadlock against the thread's own admission group, so
/// it is rejected as a fatal programming error.
pub(crate) fn track(lock: usize) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        assert!(
            !held.contains(&lock),
            "this thread already holds the multilock it is acquiring",
        );
        held.push(lock);
    });
}

/// Removes `lock` from the current thread's held set.
///
/// # Panics
///
/// Panics on an unlock with no matching acquire on this thread.
pub(crate) fn untrack(lock: usize) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        let position = held
            .iter()
            .position(|&held_lock| held_lock == lock)
            .expect("multilock released by a thread that does not hold it");
        held.swap_remove(position);
    });
}

#[cfg(test)]
pub(crate) fn holds(lock: usize) -> bool {
    HELD.with(|held| held.borrow().contains(&lock))
}
