//! Least-loaded routing over the downstream channels, with acknowledgement
//! drain from the upstream ones.

use tracing::{debug, trace, warn};

use super::channel::{upstream_id, Envelope};
use super::command::{ChannelId, CommandKind};
use super::retry::{Backlog, Settled};
use super::scheduler::Scheduler;
use crate::Core::error::{DispatchError, DispatchResult, PublishError};
use crate::Queue::BoundedQueue;

pub struct LoadBalancer<T> {
    /// Items accepted for channel `i` and not yet acknowledged.
    distribution: Vec<u64>,
    /// Channels with a subscriber. While none has one, every channel is eligible.
    subscribed: Vec<bool>,
    last_used: Option<ChannelId>,
    publish_backlog: Backlog<Envelope<T>>,
    drain_backlog: Backlog<Envelope<T>>,
}

impl<T> LoadBalancer<T> {
    pub fn new(channels: usize, backlog_capacity: usize) -> DispatchResult<Self> {
        if channels == 0 {
            return Err(DispatchError::NoChannels);
        }
        Ok(Self {
            distribution: vec![0; channels],
            subscribed: vec![false; channels],
            last_used: None,
            publish_backlog: Backlog::new(CommandKind::Write, backlog_capacity)?,
            drain_backlog: Backlog::new(CommandKind::Read, backlog_capacity)?,
        })
    }

    pub fn channels(&self) -> usize {
        self.distribution.len()
    }

    pub fn distribution(&self) -> &[u64] {
        &self.distribution
    }

    pub fn last_used(&self) -> Option<ChannelId> {
        self.last_used
    }

    /// Route to `channel` from now on. Once any channel is subscribed, channels
    /// without a subscriber get no more publishes.
    pub fn mark_subscribed(&mut self, channel: ChannelId) {
        if let Some(flag) = self.subscribed.get_mut(channel) {
            *flag = true;
        }
    }

    fn eligible(&self, channel: ChannelId) -> bool {
        self.subscribed[channel] || !self.subscribed.contains(&true)
    }

    /// Publishes still parked for retry.
    pub fn pending_publishes(&self) -> usize {
        self.publish_backlog.len()
    }

    pub fn pending_drains(&self) -> usize {
        self.drain_backlog.len()
    }

    /// Channel the next publish goes to.
    ///
    /// The leftmost minimum of the distribution, unless that is the channel used
    /// last; then the next eligible one after it, round-robin.
    pub fn select(&self) -> ChannelId {
        let n = self.channels();
        let least = argmin(&self.distribution, |i| self.eligible(i));
        match self.last_used {
            Some(last) if last == least => (1..=n)
                .map(|step| (last + step) % n)
                .find(|&i| self.eligible(i))
                .unwrap_or(least),
            _ => least,
        }
    }

    /// Route `item` to a channel, then run a drain pass whatever happened.
    ///
    /// The item counts against its channel as soon as the scheduler or the
    /// publish backlog holds it, so an acknowledgement never overtakes it.
    pub fn publish(
        &mut self,
        scheduler: &Scheduler<Envelope<T>>,
        item: T,
    ) -> Result<ChannelId, PublishError<T>> {
        if !self.publish_backlog.has_room() {
            self.retry_publishes(scheduler);
            if !self.publish_backlog.has_room() {
                warn!(
                    backlog = self.publish_backlog.capacity(),
                    "publish backlog is full"
                );
                self.drain_logged(scheduler);
                return Err(PublishError::Backlogged(item));
            }
        }

        let target = self.select();
        debug!(channel = target, distribution = ?self.distribution, "publish");
        match self
            .publish_backlog
            .submit_write(scheduler, target, Envelope::Item(item))
        {
            Ok(Some(settled)) => trace!(channel = settled.channel(), "publish settled"),
            Ok(None) => trace!(channel = target, "publish parked"),
            Err(unsubmitted) => {
                warn!(channel = target, err = %unsubmitted.error, "publish could not be recorded");
                // without a payload the scheduler holds the item, so it still counts
                if let Some(item) = unsubmitted.payload.and_then(Envelope::into_item) {
                    self.drain_logged(scheduler);
                    return Err(PublishError::Backlogged(item));
                }
            }
        }
        self.distribution[target] += 1;
        self.last_used = Some(target);

        self.drain_logged(scheduler);
        Ok(target)
    }

    /// Read every upstream queue once and apply the acknowledgements found.
    /// Returns the number of items acknowledged.
    pub fn drain(&mut self, scheduler: &Scheduler<Envelope<T>>) -> DispatchResult<u64> {
        let channels = self.channels();
        let mut acked = 0;

        let distribution = &mut self.distribution;
        self.drain_backlog.retry(scheduler, |settled| {
            acked += apply_ack(distribution, channels, settled);
        })?;
        // one outstanding read per upstream queue at most
        if !self.drain_backlog.is_empty() {
            return Ok(acked);
        }

        for channel in 0..channels {
            let upstream = upstream_id(channel, channels);
            let reads = scheduler.target(upstream)?.capacity();
            for _ in 0..reads {
                if !self.drain_backlog.has_room() {
                    return Ok(acked);
                }
                match self.drain_backlog.submit_read(scheduler, upstream)? {
                    Some(settled @ Settled::NoDefect { item: Some(_), .. }) => {
                        acked += apply_ack(&mut self.distribution, channels, settled);
                    }
                    _ => break,
                }
            }
        }
        Ok(acked)
    }

    /// Retry both backlogs once and drain, without publishing anything.
    pub fn flush(&mut self, scheduler: &Scheduler<Envelope<T>>) -> DispatchResult<u64> {
        self.retry_publishes(scheduler);
        self.drain(scheduler)
    }

    /// Drop parked publishes and saved writes for channels `keep` rejects.
    /// Returns how many items were dropped.
    pub fn discard_unless<F>(&mut self, scheduler: &Scheduler<Envelope<T>>, mut keep: F) -> DispatchResult<usize>
    where
        F: FnMut(ChannelId) -> bool,
    {
        let parked = self.publish_backlog.discard(|channel| !keep(channel));
        let mut dropped = 0;
        for channel in 0..self.channels() {
            if !keep(channel) {
                dropped += scheduler.discard_writes(channel)?;
            }
        }
        if parked + dropped > 0 {
            debug!(parked, dropped, "discarded publishes for channels without a subscriber");
        }
        Ok(dropped)
    }

    fn retry_publishes(&mut self, scheduler: &Scheduler<Envelope<T>>) {
        let retried = self.publish_backlog.retry(scheduler, |settled| {
            trace!(channel = settled.channel(), "parked publish settled");
        });
        if let Err(err) = retried {
            warn!(%err, "publish retry pass failed");
        }
    }

    fn drain_logged(&mut self, scheduler: &Scheduler<Envelope<T>>) {
        if let Err(err) = self.drain(scheduler) {
            warn!(%err, "drain pass failed");
        }
    }
}

/// Leftmost index of the smallest value among those `eligible` accepts, or 0.
fn argmin<F>(values: &[u64], eligible: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if !eligible(i) {
            continue;
        }
        if best.map_or(true, |b| *v < values[b]) {
            best = Some(i);
        }
    }
    best.unwrap_or(0)
}

/// Subtract an upstream acknowledgement from its channel, never below zero.
fn apply_ack<T>(distribution: &mut [u64], channels: usize, settled: Settled<Envelope<T>>) -> u64 {
    let Settled::NoDefect { channel, item: Some(envelope) } = settled else {
        return 0;
    };
    let downstream = channel.wrapping_sub(channels);
    match (envelope, distribution.get_mut(downstream)) {
        (Envelope::Ack(k), Some(count)) => {
            if k > *count {
                warn!(channel = downstream, ack = k, count = *count, "acknowledged more than was routed");
            }
            *count = count.saturating_sub(k);
            k
        }
        (Envelope::Item(_), _) | (_, None) => {
            warn!(channel, "unexpected message on an upstream queue");
            0
        }
    }
}
