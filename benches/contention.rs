//! Timed contention driver: every worker repeatedly takes a two-key
//! multilock and a pair of global read locks, mirroring a mixed
//! fine-grained/global workload.

use {
    bloom_lock::MultiLock,
    rand::Rng,
    std::{sync::Barrier, thread, time::Instant},
};

const CYCLES: u32 = 100_000;

fn main() {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    let workers = if cores > 2 { cores - 1 } else { cores };

    let lock = MultiLock::new();
    let start = Barrier::new(workers);

    thread::scope(|s| {
        for _ in 0..workers {
            let lock = &lock;
            let start = &start;
            s.spawn(move || {
                let mut rng = rand::rng();
                // Force the keys nonzero; 0 is the reserved null key.
                let read_key = rng.random_range(1..u32::MAX) | 1;
                let write_key = rng.random_range(1..u32::MAX) | 1;

                start.wait();
                let begin = Instant::now();
                for _ in 0..CYCLES {
                    drop(lock.multilock([read_key], [write_key]).unwrap());
                    drop(lock.global_read_lock().unwrap());
                    drop(lock.global_read_lock().unwrap());
                }
                eprintln!(
                    "{} lock cycles: {:?}",
                    CYCLES * 3,
                    begin.elapsed(),
                );
            });
        }
    });
}
