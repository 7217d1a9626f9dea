// Property suite shared by both BoundedQueue implementations.
//
// Every check runs against RingQueue (lock-free) and GuardedQueue (mutex),
// so the two stay interchangeable behind SharedQueue.
//
// cargo test --test queue_properties -- --nocapture

use hyperfunnel::{BoundedQueue, GuardedQueue, RingQueue, SharedQueue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn variants<T: Send + 'static>(capacity: usize) -> Vec<(&'static str, SharedQueue<T>)> {
    vec![
        ("ring", Arc::new(RingQueue::new(capacity).unwrap())),
        ("guarded", Arc::new(GuardedQueue::new(capacity).unwrap())),
    ]
}

#[test]
fn capacity_four_scenario() {
    for (name, q) in variants::<u32>(4) {
        for i in 1..=4 {
            assert!(q.enqueue(i).is_ok(), "{name}: enqueue {i}");
        }
        assert_eq!(q.enqueue(5), Err(5), "{name}: fifth enqueue");
        assert!(q.is_full());
        assert_eq!(q.len(), 4);

        for i in 1..=4 {
            assert_eq!(q.dequeue(), Some(i), "{name}: dequeue {i}");
        }
        assert_eq!(q.dequeue(), None, "{name}: fifth dequeue");
        assert!(q.is_empty());
    }
}

#[test]
fn single_slot_queues_hold_one_item() {
    for (name, q) in variants::<u32>(1) {
        for round in 0..5 {
            assert!(q.enqueue(round).is_ok(), "{name}: enqueue in round {round}");
            assert_eq!(q.enqueue(100), Err(100), "{name}: second enqueue in round {round}");
            assert_eq!(q.len(), 1, "{name}");
            assert!(q.is_full());
            assert_eq!(q.peek(), Some(round));
            assert_eq!(q.dequeue(), Some(round), "{name}: dequeue in round {round}");
            assert_eq!(q.dequeue(), None, "{name}: empty after round {round}");
        }
        // left full on purpose: drop releases it
        q.enqueue(9).unwrap();
    }
}

#[test]
fn single_slot_ring_survives_contention() {
    const ITEMS: u64 = 20_000;
    let q: Arc<RingQueue<u64>> = Arc::new(RingQueue::new(1).unwrap());

    let producers: Vec<_> = (0..2u64)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..ITEMS {
                    let mut v = p * ITEMS + i;
                    while let Err(back) = q.enqueue(v) {
                        v = back;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let consumer = {
        let q = q.clone();
        thread::spawn(move || {
            let mut seen = HashSet::new();
            while (seen.len() as u64) < 2 * ITEMS {
                match q.dequeue() {
                    Some(v) => assert!(seen.insert(v), "duplicate {v}"),
                    None => thread::yield_now(),
                }
                let (w, r) = q.cursors();
                assert!(w >= r);
            }
            seen.len()
        })
    };

    for p in producers {
        p.join().unwrap();
    }
    assert_eq!(consumer.join().unwrap() as u64, 2 * ITEMS);
    assert!(q.is_empty());
}

#[test]
fn peek_matches_the_next_dequeue() {
    for (name, q) in variants::<String>(3) {
        assert_eq!(q.peek(), None);
        q.enqueue("x".into()).unwrap();
        q.enqueue("y".into()).unwrap();
        assert_eq!(q.peek().as_deref(), Some("x"), "{name}");
        assert_eq!(q.len(), 2, "{name}: peek must not consume");
        assert_eq!(q.dequeue().as_deref(), Some("x"));
        assert_eq!(q.peek().as_deref(), Some("y"));
    }
}

#[test]
fn random_single_thread_interleaving_follows_a_model() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);

    for (name, q) in variants::<u64>(7) {
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u64;

        for step in 0..20_000 {
            if rng.bool() {
                match q.enqueue(next) {
                    Ok(()) => model.push_back(next),
                    Err(v) => {
                        assert_eq!(v, next);
                        assert_eq!(model.len(), 7, "{name}: rejected below capacity at {step}");
                    }
                }
                next += 1;
            } else {
                assert_eq!(q.dequeue(), model.pop_front(), "{name}: order at {step}");
            }
            assert_eq!(q.len(), model.len(), "{name}: len at {step}");
            assert!(q.len() <= q.capacity());
        }
    }
}

#[test]
fn concurrent_producers_and_consumers_lose_nothing() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 20_000;

    for (name, q) in variants::<u64>(64) {
        let producing = Arc::new(AtomicBool::new(true));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let mut v = p * PER_PRODUCER + i;
                        while let Err(back) = q.enqueue(v) {
                            v = back;
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                let producing = producing.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    // per-producer order must hold within one consumer
                    let mut last = vec![None; PRODUCERS as usize];
                    loop {
                        match q.dequeue() {
                            Some(v) => {
                                let p = (v / PER_PRODUCER) as usize;
                                if let Some(prev) = last[p] {
                                    assert!(v > prev, "FIFO broken for producer {p}");
                                }
                                last[p] = Some(v);
                                seen.push(v);
                            }
                            None if !producing.load(Ordering::Acquire) => break,
                            None => thread::yield_now(),
                        }
                    }
                    seen
                })
            })
            .collect();

        let observer = {
            let q = q.clone();
            let producing = producing.clone();
            thread::spawn(move || {
                while producing.load(Ordering::Acquire) {
                    assert!(q.len() <= q.capacity());
                }
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        producing.store(false, Ordering::Release);
        observer.join().unwrap();

        let mut all = HashSet::new();
        let mut total = 0;
        for c in consumers {
            for v in c.join().unwrap() {
                assert!(all.insert(v), "{name}: duplicate {v}");
                total += 1;
            }
        }
        while let Some(v) = q.dequeue() {
            assert!(all.insert(v), "{name}: duplicate {v}");
            total += 1;
        }

        assert_eq!(total, PRODUCERS * PER_PRODUCER, "{name}: lost items");
        assert!(q.is_empty());
        println!("✓ {name}: {total} items, each delivered once");
    }
}

#[test]
fn ring_cursors_stay_within_capacity() {
    let q = Arc::new(RingQueue::new(5).unwrap());
    let running = Arc::new(AtomicBool::new(true));

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let q = q.clone();
            thread::spawn(move || {
                let mut rng = fastrand::Rng::with_seed(t);
                for i in 0..50_000u32 {
                    if rng.bool() {
                        let _ = q.enqueue(i);
                    } else {
                        q.dequeue();
                    }
                }
            })
        })
        .collect();

    let checker = {
        let q = q.clone();
        let running = running.clone();
        thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                let (w, r) = q.cursors();
                assert!(w >= r, "w {w} behind r {r}");
                assert!(q.len() <= 5);
            }
        })
    };

    for w in workers {
        w.join().unwrap();
    }
    running.store(false, Ordering::Release);
    checker.join().unwrap();

    let (w, r) = q.cursors();
    assert!(w - r <= 5);
    assert_eq!((w - r) as usize, q.len());
}

#[test]
fn guarded_cursors_are_exact() {
    let q = GuardedQueue::new(3).unwrap();
    for i in 0..10u8 {
        q.enqueue(i).unwrap();
        q.enqueue(i).unwrap();
        q.dequeue();
        q.dequeue();
        let (w, r) = q.cursors();
        assert_eq!(w - r, 0);
        assert_eq!(w, 2 * (i as u64 + 1));
    }
}
