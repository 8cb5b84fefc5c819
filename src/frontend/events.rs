//! Event-processing state machine of the front model
//!
//! A pure function of the pending-state buckets and one timer latch
//! decides, on every event, which command to issue. Heavy work is
//! coalesced through a debounce deadline whose interval adapts to the
//! observed cost of the previous heavy operation.

use std::time::{Duration, Instant};

/// Shortest debounce interval; light operations pass straight through.
pub const MIN_TIMEOUT_MS: i64 = 0;
/// Longest debounce interval under sustained heavy load.
pub const MAX_TIMEOUT_MS: i64 = 2000;
/// Continuous-busy time before the busy indicator engages.
pub const BUSY_INDICATOR_DELAY: Duration = Duration::from_secs(1);

/// Everything that can happen to the front model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    // heavy user operations
    SortOperation,
    FilterOperation,
    /// Deletion of the selected local rows was requested.
    DeleteOperation,

    // easy user operations
    WindowOperation,
    SelectionOperation,
    SelectionAndWindowOperation,

    // heavy data operations
    NewDataPackReceived,

    FrontEndStateChanged,
    BackEndStateChanged,

    /// The last producer pack arrived.
    LoadingFinished,
    /// The coalescing period elapsed.
    TimerExpired,
    /// The store finished clearing.
    ClearCompleted,

    UserQueryRequested,
    UserQueryCompleted,

    /// The store is in a broken state; nothing runs after this.
    ErrorOccured,

    /// The user toggled the update-suspension flag.
    UpdateSuspensionFlagChanged,
}

/// What the model must send next, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DoNothing,
    /// Easy operation: window/selection/hints.
    SendUserAction,
    /// Heavy operation: deltas, sort, filter.
    SendUpdate,
    SendUserQuery,
}

/// Readiness and demand flags the processor decides from, computed by the
/// model from its pending-state buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingFlags {
    pub frontend_ready: bool,
    pub backend_ready: bool,
    pub user_query_needed: bool,
    pub easy_needed: bool,
    pub heavy_needed: bool,
    pub data_needed: bool,
}

pub struct EventProcessor {
    deadline: Option<Instant>,
    send_allowed: bool,
    last_heavy_ms: i64,
    error_occured: bool,
}

impl Default for EventProcessor {
    fn default() -> Self {
        Self {
            deadline: None,
            send_allowed: false,
            last_heavy_ms: MIN_TIMEOUT_MS,
            error_occured: false,
        }
    }
}

impl EventProcessor {
    /// Feed one event and decide the next command.
    pub fn process_event(&mut self, event: Event, flags: &PendingFlags) -> Command {
        self.handle_event(event);
        self.command(flags)
    }

    fn handle_event(&mut self, event: Event) {
        if self.error_occured {
            return;
        }

        match event {
            // data events only start an idle timer, so a burst coalesces
            Event::LoadingFinished
            | Event::NewDataPackReceived
            | Event::UpdateSuspensionFlagChanged => self.start_timer(false),
            // user operations force-restart the accumulation period
            Event::SortOperation
            | Event::FilterOperation
            | Event::DeleteOperation
            | Event::WindowOperation
            | Event::SelectionOperation
            | Event::SelectionAndWindowOperation => self.start_timer(true),
            Event::FrontEndStateChanged
            | Event::BackEndStateChanged
            | Event::TimerExpired
            | Event::ClearCompleted
            | Event::UserQueryRequested
            | Event::UserQueryCompleted => {}
            Event::ErrorOccured => self.error_occured = true,
        }
    }

    fn command(&self, flags: &PendingFlags) -> Command {
        if self.error_occured {
            return Command::DoNothing;
        }

        if flags.backend_ready {
            if flags.frontend_ready {
                if flags.user_query_needed {
                    return Command::SendUserQuery;
                }
                if flags.easy_needed {
                    return Command::SendUserAction;
                }
                if self.send_allowed && flags.heavy_needed {
                    return Command::SendUpdate;
                }
            }
            // data keeps flowing even before the first view is shown
            if self.send_allowed && flags.data_needed {
                return Command::SendUpdate;
            }
        }

        Command::DoNothing
    }

    fn start_timer(&mut self, force: bool) {
        if force || (!self.send_allowed && self.deadline.is_none()) {
            self.send_allowed = false;
            self.deadline = Some(Instant::now() + Duration::from_millis(self.interval_ms() as u64));
        }
    }

    /// Adaptive interval: twice the last observed heavy-operation cost,
    /// clamped so bursts coalesce under load while light operations pass
    /// through quickly.
    fn interval_ms(&self) -> i64 {
        (2 * self.last_heavy_ms).clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
    }

    pub fn set_last_heavy_ms(&mut self, ms: i64) {
        self.last_heavy_ms = ms.max(MIN_TIMEOUT_MS);
    }

    /// When the deadline elapsed, open the send latch and report that a
    /// `TimerExpired` event is due.
    pub fn poll_timer(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.send_allowed = true;
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_error(&self) -> bool {
        self.error_occured
    }

    /// Busy predicate for the cursor indicator.
    pub fn is_busy(&self, flags: &PendingFlags) -> bool {
        if !flags.frontend_ready {
            return false;
        }
        !flags.backend_ready || flags.heavy_needed || flags.data_needed
    }
}
