use std::fmt;

use crate::Dispatch::{Dispatcher, LoadBalancer, Scheduler};
use crate::Queue::{BoundedQueue, GuardedQueue, RingQueue};

/// Debug function for RingQueue
///
/// Shows the cursors and the logical length. Slot contents are never read, so
/// `T` needs no `Debug` bound and no slot is pinned.
pub fn debug_ring_queue<T>(queue: &RingQueue<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (w, r) = queue.cursors();
    f.debug_struct("RingQueue")
        .field("capacity", &queue.capacity())
        .field("len", &queue.len())
        .field("w", &w)
        .field("r", &r)
        .finish_non_exhaustive()
}

/// Debug function for GuardedQueue
pub fn debug_guarded_queue<T>(queue: &GuardedQueue<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (w, r) = queue.cursors();
    f.debug_struct("GuardedQueue")
        .field("capacity", &queue.capacity())
        .field("len", &w.wrapping_sub(r))
        .field("w", &w)
        .field("r", &r)
        .finish_non_exhaustive()
}

/// Debug function for Scheduler
///
/// Counters are read with a `try_lock`; a contended token prints as such
/// instead of blocking the formatter.
pub fn debug_scheduler<M>(scheduler: &Scheduler<M>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = f.debug_struct("Scheduler");
    s.field("targets", &scheduler.target_count())
        .field("max_targets", &scheduler.max_targets())
        .field("max_jobs", &scheduler.max_jobs())
        .field("quota_window", &scheduler.quota_window());
    match scheduler.try_counters() {
        Some(counters) => s.field("counters", &counters),
        None => s.field("counters", &"<token held>"),
    };
    s.finish()
}

/// Debug function for LoadBalancer
pub fn debug_load_balancer<T>(balancer: &LoadBalancer<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoadBalancer")
        .field("distribution", &balancer.distribution())
        .field("last_used", &balancer.last_used())
        .field("pending_publishes", &balancer.pending_publishes())
        .field("pending_drains", &balancer.pending_drains())
        .finish()
}

/// Debug function for Dispatcher
pub fn debug_dispatcher<T: Send + 'static>(
    dispatcher: &Dispatcher<T>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let mut s = f.debug_struct("Dispatcher");
    s.field("channels", &dispatcher.channel_count())
        .field("subscribed", &dispatcher.subscribed())
        .field("ready", &dispatcher.is_ready())
        .field("closed", &dispatcher.is_closed());
    match dispatcher.try_distribution() {
        Some(distribution) => s.field("distribution", &distribution),
        None => s.field("distribution", &"<balancer busy>"),
    };
    s.field("scheduler", dispatcher.scheduler()).finish()
}
