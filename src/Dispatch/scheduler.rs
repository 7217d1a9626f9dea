//! Two-phase, token-guarded scheduler multiplexing reads and writes from many
//! callers onto a registry of shared target queues.
//!
//! Every call is non-blocking. `Save` records intent as a [`Command`] in the
//! inbound (write) or outbound (read) queue and immediately falls through to
//! `Execute`, which applies the command at the front of that queue. Each step
//! takes the token with a `try_lock` and releases it before returning, so a
//! caller that loses a race gets a [`Failure`] code back and retries from its
//! own loop.
//!
//! The quota window `mcop` bounds how many execute steps go through the token
//! in a row: every `mcop`-th execute in a direction is an early release.

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::command::{Applied, ChannelId, Command, CommandKind};
use crate::Core::error::{DispatchError, DispatchResult};
use crate::Queue::{BoundedQueue, GuardedQueue, SharedQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Save,
    Execute,
}

/// Phase of a write. Only `Save` carries the payload; an `Execute` retry works
/// on the command that an earlier save already recorded.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteStep<M> {
    Save(M),
    Execute,
}

impl<M> WriteStep<M> {
    pub fn phase(&self) -> Phase {
        match self {
            WriteStep::Save(_) => Phase::Save,
            WriteStep::Execute => Phase::Execute,
        }
    }
}

/// Result of one execute step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Initialized,
    Failure,
    Completed,
    NoDefect,
    EarlyRelease,
}

/// Caller-visible outcome codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Token busy or command queue full; nothing was recorded. Retry the save.
    Save,
    /// Saved, but the execute step lost the token or could not apply. Retry execute.
    Execute,
    /// Saved, but the quota forced a yield. Retry execute.
    EarlyRelease,
    /// A command was applied.
    NoDefect,
    /// Nothing was pending.
    Successful,
}

impl Failure {
    /// Phase the caller must retry with, `None` for terminal outcomes.
    pub fn retry_phase(self) -> Option<Phase> {
        match self {
            Failure::Save => Some(Phase::Save),
            Failure::Execute | Failure::EarlyRelease => Some(Phase::Execute),
            Failure::NoDefect | Failure::Successful => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.retry_phase().is_none()
    }
}

impl From<Status> for Failure {
    fn from(status: Status) -> Self {
        match status {
            Status::Initialized | Status::Failure => Failure::Execute,
            Status::EarlyRelease => Failure::EarlyRelease,
            Status::NoDefect => Failure::NoDefect,
            Status::Completed => Failure::Successful,
        }
    }
}

/// What a scheduler call hands back.
///
/// `item` is the unsaved payload after a write-side [`Failure::Save`], or the
/// value taken from the target after a read-side [`Failure::NoDefect`].
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct Outcome<M> {
    pub failure: Failure,
    pub item: Option<M>,
}

impl<M> Outcome<M> {
    fn bare(failure: Failure) -> Self {
        Self {
            failure,
            item: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.failure.is_terminal()
    }

    pub fn into_item(self) -> Option<M> {
        self.item
    }
}

/// Snapshot of the scheduler's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub w_sched: u64,
    /// Position in the write quota window, `0..mcop`.
    pub w_exec: u64,
    /// Writes applied to a target.
    pub w_done: u64,
    pub r_sched: u64,
    pub r_exec: u64,
    pub r_done: u64,
    /// Writes applied minus reads that returned an item.
    pub in_flight: u64,
}

/// Everything the token guards.
struct Ledger<M> {
    inbound: GuardedQueue<Command<M>>,
    outbound: GuardedQueue<Command<M>>,
    pending_writes: Vec<usize>,
    pending_reads: Vec<usize>,
    counters: Counters,
}

pub struct Scheduler<M> {
    token: Mutex<Ledger<M>>,
    targets: Vec<SharedQueue<M>>,
    max_targets: usize,
    max_jobs: usize,
    quota_window: u64,
}

impl<M> Scheduler<M> {
    /// Create a scheduler with room for `max_targets` targets and `max_jobs`
    /// pending commands per direction.
    pub fn new(max_targets: usize, max_jobs: usize, quota_window: usize) -> DispatchResult<Self> {
        if max_targets == 0 {
            return Err(DispatchError::NoChannels);
        }
        if quota_window < 2 {
            return Err(DispatchError::QuotaWindow(quota_window));
        }

        Ok(Self {
            token: Mutex::new(Ledger {
                inbound: GuardedQueue::new(max_jobs)?,
                outbound: GuardedQueue::new(max_jobs)?,
                pending_writes: Vec::with_capacity(max_targets),
                pending_reads: Vec::with_capacity(max_targets),
                counters: Counters::default(),
            }),
            targets: Vec::with_capacity(max_targets),
            max_targets,
            max_jobs,
            quota_window: quota_window as u64,
        })
    }

    /// Register a target queue; its id is the registration order.
    pub fn add_target(&mut self, target: SharedQueue<M>) -> DispatchResult<ChannelId> {
        if self.targets.len() >= self.max_targets {
            tracing::warn!(max_targets = self.max_targets, "could not add any more targets");
            return Err(DispatchError::RegistryFull(self.max_targets));
        }

        let ledger = self.token.get_mut();
        ledger.pending_writes.push(0);
        ledger.pending_reads.push(0);
        self.targets.push(target);
        Ok(self.targets.len() - 1)
    }

    pub fn target(&self, channel: ChannelId) -> DispatchResult<&SharedQueue<M>> {
        self.targets.get(channel).ok_or(DispatchError::UnknownChannel {
            channel,
            count: self.targets.len(),
        })
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn max_targets(&self) -> usize {
        self.max_targets
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn quota_window(&self) -> usize {
        self.quota_window as usize
    }

    /// Write path: record a write for `channel` and/or apply the front pending write.
    pub fn enqueue(&self, channel: ChannelId, step: WriteStep<M>) -> DispatchResult<Outcome<M>> {
        self.target(channel)?;
        Ok(self.enqueue_checked(channel, step))
    }

    /// [`enqueue`](Self::enqueue) for a channel already looked up with [`target`](Self::target).
    pub(crate) fn enqueue_checked(&self, channel: ChannelId, step: WriteStep<M>) -> Outcome<M> {
        if let WriteStep::Save(payload) = step {
            let Some(mut ledger) = self.token.try_lock() else {
                trace!(channel, "scheduler: cannot acquire the token");
                return Outcome {
                    failure: Failure::Save,
                    item: Some(payload),
                };
            };

            let mut cmd = Command::write(channel, payload);
            cmd.schedule();
            if let Err(cmd) = ledger.inbound.enqueue(cmd) {
                trace!(channel, "scheduler: inbound queue exception");
                return Outcome {
                    failure: Failure::Save,
                    item: cmd.into_payload(),
                };
            }

            ledger.counters.w_sched += 1;
            ledger.pending_writes[channel] += 1;
            // token released here; execute re-acquires it
        }

        Outcome::bare(self.execute_write().into())
    }

    /// Read path: record a read for `channel` and/or apply the caller's front pending read.
    pub fn dequeue(&self, channel: ChannelId, phase: Phase) -> DispatchResult<Outcome<M>> {
        self.target(channel)?;

        if phase == Phase::Save {
            let Some(mut ledger) = self.token.try_lock() else {
                trace!(channel, "scheduler: cannot acquire the token");
                return Ok(Outcome::bare(Failure::Save));
            };

            let mut cmd = Command::read(channel);
            cmd.schedule();
            if ledger.outbound.enqueue(cmd).is_err() {
                trace!(channel, "scheduler: outbound queue exception");
                return Ok(Outcome::bare(Failure::Save));
            }

            ledger.counters.r_sched += 1;
            ledger.pending_reads[channel] += 1;
        }

        let (status, item) = self.execute_read(channel);
        Ok(Outcome {
            failure: status.into(),
            item,
        })
    }

    fn execute_write(&self) -> Status {
        let Some(mut guard) = self.token.try_lock() else {
            trace!("scheduler: cannot acquire the token");
            return Status::Failure;
        };
        let ledger = &mut *guard;

        ledger.counters.w_exec = (ledger.counters.w_exec + 1) % self.quota_window;
        if ledger.counters.w_exec == 0 {
            trace!("scheduler: early release");
            return Status::EarlyRelease;
        }

        let Some(cmd) = ledger.inbound.front_mut() else {
            trace!("scheduler: completed");
            return Status::Completed;
        };
        debug_assert_eq!(cmd.probe(), CommandKind::Write);

        let channel = cmd.channel();
        match cmd.apply(&*self.targets[channel]) {
            Applied::Written => {
                ledger.inbound.dequeue();
                ledger.pending_writes[channel] -= 1;
                ledger.counters.w_done += 1;
                ledger.counters.in_flight += 1;
                trace!(channel, "scheduler: no defect");
                Status::NoDefect
            }
            _ => {
                // a full target must not hold up writes queued behind it
                ledger.inbound.rotate_front();
                trace!(channel, "scheduler: target full, write moved to the back");
                Status::Failure
            }
        }
    }

    fn execute_read(&self, channel: ChannelId) -> (Status, Option<M>) {
        let Some(mut guard) = self.token.try_lock() else {
            trace!(channel, "scheduler: cannot acquire the token");
            return (Status::Failure, None);
        };
        let ledger = &mut *guard;

        ledger.counters.r_exec = (ledger.counters.r_exec + 1) % self.quota_window;
        if ledger.counters.r_exec == 0 {
            trace!(channel, "scheduler: early release");
            return (Status::EarlyRelease, None);
        }

        if ledger.pending_reads[channel] == 0 {
            trace!(channel, "scheduler: completed");
            return (Status::Completed, None);
        }

        // A read can only be handed to the caller that saved it.
        let Some(cmd) = ledger.outbound.front_mut() else {
            return (Status::Completed, None);
        };
        debug_assert_eq!(cmd.probe(), CommandKind::Read);
        if cmd.channel() != channel {
            trace!(channel, ahead = cmd.channel(), "scheduler: another read is ahead");
            return (Status::Failure, None);
        }

        let Applied::Read(item) = cmd.apply(&*self.targets[channel]) else {
            return (Status::Failure, None);
        };
        ledger.outbound.dequeue();
        ledger.pending_reads[channel] -= 1;
        ledger.counters.r_done += 1;
        if item.is_some() {
            ledger.counters.in_flight = ledger.counters.in_flight.saturating_sub(1);
        }
        trace!(channel, hit = item.is_some(), "scheduler: no defect");
        (Status::NoDefect, item)
    }

    /// Whether `channel`'s target is empty. Reports `false` while the token is
    /// contended; callers poll again.
    pub fn is_empty(&self, channel: ChannelId) -> DispatchResult<bool> {
        let target = self.target(channel)?;
        let Some(_ledger) = self.token.try_lock() else {
            return Ok(false);
        };
        Ok(target.is_empty())
    }

    /// Target empty and no saved write still waiting for it. `false` while contended.
    pub fn is_settled(&self, channel: ChannelId) -> DispatchResult<bool> {
        let target = self.target(channel)?;
        let Some(ledger) = self.token.try_lock() else {
            return Ok(false);
        };
        Ok(target.is_empty() && ledger.pending_writes[channel] == 0)
    }

    /// Saved writes for `channel` not yet applied, `None` while contended.
    pub fn pending_writes(&self, channel: ChannelId) -> DispatchResult<Option<usize>> {
        self.target(channel)?;
        Ok(self
            .token
            .try_lock()
            .map(|ledger| ledger.pending_writes[channel]))
    }

    /// Saved reads for `channel` not yet applied, `None` while contended.
    pub fn pending_reads(&self, channel: ChannelId) -> DispatchResult<Option<usize>> {
        self.target(channel)?;
        Ok(self
            .token
            .try_lock()
            .map(|ledger| ledger.pending_reads[channel]))
    }

    /// Drop every saved write for `channel`, payload included. Waits for the token.
    /// Returns how many were dropped.
    pub fn discard_writes(&self, channel: ChannelId) -> DispatchResult<usize> {
        self.target(channel)?;
        let mut guard = self.token.lock();
        let ledger = &mut *guard;
        let dropped = ledger.inbound.retain(|cmd| cmd.channel() != channel);
        ledger.pending_writes[channel] = ledger.pending_writes[channel].saturating_sub(dropped);
        if dropped > 0 {
            debug!(channel, dropped, "scheduler: discarded saved writes");
        }
        Ok(dropped)
    }

    /// Counter snapshot. Waits for the token.
    pub fn counters(&self) -> Counters {
        self.token.lock().counters
    }

    /// Counter snapshot, `None` while the token is held elsewhere.
    pub fn try_counters(&self) -> Option<Counters> {
        self.token.try_lock().map(|ledger| ledger.counters)
    }

    pub fn in_flight(&self) -> u64 {
        self.counters().in_flight
    }
}
