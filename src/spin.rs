use {
    parking_lot::lock_api::{GuardSend, RawMutex as RawMutexTrait},
    std::{
        hint,
        sync::atomic::{
            AtomicBool,
            Ordering::{Acquire, Relaxed, Release},
        },
    },
};

#[cfg(test)]
mod tests;

/// A test-and-test-and-set spin mutex.
///
/// The lock's internal critical sections are a handful of instructions, so
/// under low contention spinning beats parking the thread. Plug this in
/// via [`SpinMultiLock`](crate::SpinMultiLock); under oversubscription
/// prefer the default blocking mutex.
pub struct RawSpinMutex {
    locked: AtomicBool,
}

unsafe impl RawMutexTrait for RawSpinMutex {
    const INIT: Self = RawSpinMutex {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Acquire, Relaxed)
            .is_err()
        {
            // Spin on the read-only load to keep the line shared until
            // the holder releases.
            while self.locked.load(Relaxed) {
                hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}
