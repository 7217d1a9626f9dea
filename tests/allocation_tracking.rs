// Allocation tracking for the dispatch cycle
//
// Note: dhat only allows one profiler per process, so everything measured
// lives in one test, marked #[serial_test::serial]. dhat's testing mode needs
// dhat::Alloc installed as the global allocator of this test binary.
//
// # Run all allocation tracking tests
// cargo test --test allocation_tracking -- --nocapture

use hyperfunnel::{BoundedQueue, Dispatcher, RingQueue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Publish `count` boxed payloads through a fresh dispatcher and shut it down.
fn dispatch_cycle(count: u64) -> u64 {
    let d = Dispatcher::<Box<u64>>::new(2, 16).unwrap();
    let total = Arc::new(AtomicU64::new(0));
    for ch in 0..2 {
        let total = total.clone();
        d.subscribe(ch, move |v: Box<u64>| {
            total.fetch_add(*v, Ordering::Relaxed);
        })
        .unwrap();
    }

    for i in 0..count {
        let mut item = Box::new(i);
        while let Err(err) = d.publish(item) {
            item = err.into_inner();
            d.flush().unwrap();
        }
    }
    d.shutdown().unwrap();
    drop(d);
    total.load(Ordering::Relaxed)
}

#[test]
#[serial_test::serial]
fn test_dispatch_cycle_with_dhat() {
    println!("\n--- Running dispatch cycle with dhat ---");
    let _profiler = dhat::Profiler::builder().testing().build();

    // Ring operations work on slots allocated up front
    let q = RingQueue::new(1024).unwrap();
    let before = dhat::HeapStats::get();
    for i in 0..10_000u64 {
        q.enqueue(i).unwrap();
        if i % 2 == 1 {
            q.dequeue();
            q.dequeue();
        }
    }
    let after = dhat::HeapStats::get();
    dhat::assert_eq!(after.total_blocks, before.total_blocks);
    assert!(q.is_empty());
    drop(q);
    println!("✓ Zero allocations during ring enqueue/dequeue");

    // first cycle registers tracing callsites and other one-time state
    assert_eq!(dispatch_cycle(100), (0..100).sum::<u64>());
    let baseline = dhat::HeapStats::get();

    assert_eq!(dispatch_cycle(1_000), (0..1_000).sum::<u64>());
    let after = dhat::HeapStats::get();

    println!("baseline: {} blocks, after: {} blocks", baseline.curr_blocks, after.curr_blocks);
    println!("allocated during cycle: {} blocks", after.total_blocks - baseline.total_blocks);
    dhat::assert_eq!(after.curr_blocks, baseline.curr_blocks);
    dhat::assert!(after.total_blocks - baseline.total_blocks >= 1_000);
    println!("✓ every boxed payload was released exactly once");
}
