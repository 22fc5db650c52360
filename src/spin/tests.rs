use {
    crate::spin::RawSpinMutex,
    parking_lot::lock_api::{Mutex, RawMutex as RawMutexTrait},
    std::thread,
};

#[test]
fn lock_unlock() {
    let mutex = RawSpinMutex::INIT;
    assert!(!mutex.is_locked());
    mutex.lock();
    assert!(mutex.is_locked());
    assert!(!mutex.try_lock());
    unsafe {
        mutex.unlock();
    }
    assert!(!mutex.is_locked());
    assert!(mutex.try_lock());
    unsafe {
        mutex.unlock();
    }
}

#[test]
fn counts_under_contention() {
    let counter: Mutex<RawSpinMutex, u64> = Mutex::new(0);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..10_000 {
                    *counter.lock() += 1;
                }
            });
        }
    });
    assert_eq!(counter.into_inner(), 40_000);
}
