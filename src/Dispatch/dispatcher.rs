//! Public façade: a balancer, a scheduler and one worker thread per subscribed channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::balancer::LoadBalancer;
use super::channel::{Channel, Envelope};
use super::command::ChannelId;
use super::scheduler::{Scheduler, WriteStep};
use super::worker::Worker;
use crate::Core::config::{DispatcherConfig, IdleStrategy, QueueKind};
use crate::Core::error::{DispatchError, DispatchResult, PublishError};
use crate::Core::idle::Idler;

pub struct DispatcherBuilder {
    channels: usize,
    capacity: usize,
    quota_window: Option<usize>,
    backlog_capacity: Option<usize>,
    queue_kind: QueueKind,
    idle: IdleStrategy,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            channels: 2,
            capacity: 1024, // slots per channel queue
            quota_window: None,
            backlog_capacity: None,
            queue_kind: QueueKind::default(),
            idle: IdleStrategy::default(),
        }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_quota_window(mut self, quota_window: usize) -> Self {
        self.quota_window = Some(quota_window);
        self
    }

    pub fn with_backlog_capacity(mut self, backlog_capacity: usize) -> Self {
        self.backlog_capacity = Some(backlog_capacity);
        self
    }

    pub fn with_queue_kind(mut self, queue_kind: QueueKind) -> Self {
        self.queue_kind = queue_kind;
        self
    }

    pub fn with_idle(mut self, idle: IdleStrategy) -> Self {
        self.idle = idle;
        self
    }

    pub fn config(&self) -> DispatcherConfig {
        let mut config = DispatcherConfig::new(self.channels, self.capacity);
        if let Some(window) = self.quota_window {
            config.quota_window = window;
        }
        if let Some(backlog) = self.backlog_capacity {
            config.backlog_capacity = backlog;
        }
        config.queue_kind = self.queue_kind;
        config.idle = self.idle;
        config
    }

    pub fn build<T: Send + 'static>(self) -> DispatchResult<Dispatcher<T>> {
        Dispatcher::with_config(self.config())
    }
}

/// State shared with the worker threads.
struct Shared<T> {
    scheduler: Scheduler<Envelope<T>>,
    balancer: Mutex<LoadBalancer<T>>,
    ready: AtomicBool,
    done: AtomicBool,
    closed: AtomicBool,
}

/// Routes published items to per-channel subscribers.
///
/// Items go to the least-loaded channel and are handed to that channel's
/// subscriber on its own thread. Every call is non-blocking apart from
/// [`shutdown`](Dispatcher::shutdown), which waits for subscribed channels to
/// drain before it stops the workers.
pub struct Dispatcher<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    channels: Vec<Channel<T>>,
    workers: Mutex<Vec<Option<JoinHandle<()>>>>,
    config: DispatcherConfig,
}

impl<T: Send + 'static> Dispatcher<T> {
    /// `channel_count` channels of `capacity` slots each, defaults elsewhere.
    pub fn new(channel_count: usize, capacity: usize) -> DispatchResult<Self> {
        Self::with_config(DispatcherConfig::new(channel_count, capacity))
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn with_config(config: DispatcherConfig) -> DispatchResult<Self> {
        config.validate()?;
        let count = config.channels;

        let channels = (0..count)
            .map(|i| Channel::new(i, config.queue_kind, config.capacity))
            .collect::<DispatchResult<Vec<_>>>()?;

        // every queue slot may have a saved command behind it
        let max_jobs = count.saturating_mul(config.capacity).saturating_mul(2);
        let mut scheduler = Scheduler::new(2 * count, max_jobs, config.quota_window)?;
        for ch in &channels {
            scheduler.add_target(ch.downstream.clone())?;
        }
        for ch in &channels {
            scheduler.add_target(ch.upstream.clone())?;
        }

        let balancer = LoadBalancer::new(count, config.backlog_capacity)?;

        info!(
            channels = count,
            capacity = config.capacity,
            quota_window = config.quota_window,
            queue_kind = ?config.queue_kind,
            "dispatcher created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                scheduler,
                balancer: Mutex::new(balancer),
                ready: AtomicBool::new(false),
                done: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            channels,
            workers: Mutex::new((0..count).map(|_| None).collect()),
            config,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Set by the first accepted publish.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn scheduler(&self) -> &Scheduler<Envelope<T>> {
        &self.shared.scheduler
    }

    /// Accepted but unacknowledged items per channel.
    pub fn distribution(&self) -> Vec<u64> {
        self.shared.balancer.lock().distribution().to_vec()
    }

    pub(crate) fn try_distribution(&self) -> Option<Vec<u64>> {
        self.shared
            .balancer
            .try_lock()
            .map(|balancer| balancer.distribution().to_vec())
    }

    /// Items sitting in downstream queues or in a subscriber's hands.
    pub fn in_flight(&self) -> u64 {
        self.shared.scheduler.in_flight()
    }

    pub fn subscribed(&self) -> Vec<ChannelId> {
        self.workers
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(i, w)| w.as_ref().map(|_| i))
            .collect()
    }

    /// Route `item` to the least-loaded channel.
    ///
    /// Returns the chosen channel, or hands the item back when the dispatcher
    /// is shut down or the publish backlog stays full.
    pub fn publish(&self, item: T) -> Result<ChannelId, PublishError<T>> {
        let mut balancer = self.shared.balancer.lock();
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PublishError::ShutDown(item));
        }
        let channel = balancer.publish(&self.shared.scheduler, item)?;
        drop(balancer);

        if !self.shared.ready.swap(true, Ordering::AcqRel) {
            debug!("dispatcher ready");
        }
        Ok(channel)
    }

    /// Start a worker thread that hands every item routed to `channel` to `handler`.
    pub fn subscribe<F>(&self, channel: ChannelId, handler: F) -> DispatchResult<()>
    where
        F: FnMut(T) + Send + 'static,
    {
        if self.is_closed() {
            return Err(DispatchError::ShutDown);
        }

        let mut workers = self.workers.lock();
        let count = workers.len();
        let slot = workers
            .get_mut(channel)
            .ok_or(DispatchError::UnknownChannel { channel, count })?;
        if slot.is_some() {
            return Err(DispatchError::AlreadySubscribed(channel));
        }

        let worker = Worker::new(channel, count, self.config.backlog_capacity)?;
        self.shared.balancer.lock().mark_subscribed(channel);
        let shared = Arc::clone(&self.shared);
        let idle = self.config.idle;
        let handle = thread::Builder::new()
            .name(format!("hyperfunnel-worker-{channel}"))
            .spawn(move || run_worker(shared, worker, handler, idle))?;

        *slot = Some(handle);
        info!(channel, "subscribed");
        Ok(())
    }

    /// Retry parked calls and drain acknowledgements without publishing.
    pub fn flush(&self) -> DispatchResult<u64> {
        self.shared.balancer.lock().flush(&self.shared.scheduler)
    }

    /// Refuse further publishes, wait for every subscribed channel to drain,
    /// then stop and join the workers. Calling it again is a no-op.
    pub fn shutdown(&self) -> DispatchResult<()> {
        if self.shared.done.load(Ordering::Acquire) {
            return Ok(());
        }
        {
            let _balancer = self.shared.balancer.lock();
            self.shared.closed.store(true, Ordering::Release);
        }

        let subscribed = self.subscribed();
        info!(?subscribed, "shutdown: draining");
        if !subscribed.is_empty() {
            self.drain_barrier(&subscribed)?;
        }
        info!("shutdown: drain barrier passed");

        self.shared.done.store(true, Ordering::Release);
        let handles: Vec<_> = self.workers.lock().iter_mut().filter_map(Option::take).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("shutdown complete");
        Ok(())
    }

    fn drain_barrier(&self, subscribed: &[ChannelId]) -> DispatchResult<()> {
        let scheduler = &self.shared.scheduler;
        let idler = Idler::new(IdleStrategy::Backoff);

        // nobody will read these; their writes would sit in the scheduler for good
        self.shared
            .balancer
            .lock()
            .discard_unless(scheduler, |ch| subscribed.contains(&ch))?;

        loop {
            let mut settled = {
                let mut balancer = self.shared.balancer.lock();
                balancer.flush(scheduler)?;
                balancer.pending_publishes() == 0
                    && subscribed.iter().all(|&ch| balancer.distribution()[ch] == 0)
            };

            let mut stalled = false;
            for &ch in subscribed {
                stalled |= scheduler.pending_writes(ch)? != Some(0);
                settled &= scheduler.is_settled(ch)?;
            }
            if stalled {
                let nudge = scheduler.enqueue(subscribed[0], WriteStep::Execute)?;
                trace!(failure = ?nudge.failure, "shutdown: write nudge");
            }
            if settled {
                return Ok(());
            }
            idler.tick(false);
        }
    }
}

fn run_worker<T, F>(shared: Arc<Shared<T>>, mut worker: Worker<T>, mut handler: F, idle: IdleStrategy)
where
    F: FnMut(T),
{
    let idler = Idler::new(idle);
    let channel = worker.channel();

    while !shared.ready.load(Ordering::Acquire) && !shared.done.load(Ordering::Acquire) {
        idler.tick(false);
    }
    debug!(channel, "worker running");

    while !shared.done.load(Ordering::Acquire) {
        match worker.tick(&shared.scheduler, &mut handler) {
            Ok(processed) => idler.tick(processed > 0),
            Err(err) => {
                warn!(channel, %err, "worker tick failed");
                idler.tick(false);
            }
        }
    }
    debug!(channel, idle = worker.is_idle(), "worker stopped");
}

impl<T: Send + 'static> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!(%err, "shutdown on drop failed");
        }
    }
}
