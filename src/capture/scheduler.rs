//! Tick gating for periodic capture.
//!
//! The scheduler owns no timer itself; the session loop feeds it tick times
//! from a monotonic clock and it decides which ticks become captures. Ticks
//! that arrive too early or while a request is outstanding are dropped, never
//! queued.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Capture now.
    Fire,
    /// Less than one interval since the last fire.
    TooEarly,
    /// A request is still outstanding.
    InFlight,
    /// Not scheduled.
    Idle,
}

#[derive(Debug)]
pub struct CaptureScheduler {
    interval_ms: u64,
    pending_interval_ms: Option<u64>,
    state: SchedulerState,
    last_fire_ms: Option<u64>,
    in_flight: bool,
}

impl CaptureScheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            pending_interval_ms: None,
            state: SchedulerState::Idle,
            last_fire_ms: None,
            in_flight: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Begin (or restart) the schedule. A deferred interval change lands here.
    pub fn start(&mut self) {
        if let Some(interval) = self.pending_interval_ms.take() {
            self.interval_ms = interval;
        }
        self.state = SchedulerState::Scheduled;
        self.last_fire_ms = None;
        log::debug!("Capture scheduled every {} ms", self.interval_ms);
    }

    /// Back to Idle. Whatever request was outstanding is abandoned, so the
    /// guard is released with it.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Idle;
        self.last_fire_ms = None;
        self.in_flight = false;
    }

    /// Applied immediately when idle; otherwise on the next `start`.
    pub fn set_interval(&mut self, interval_ms: u64) {
        let interval_ms = interval_ms.max(1);
        match self.state {
            SchedulerState::Idle => {
                self.interval_ms = interval_ms;
                self.pending_interval_ms = None;
            }
            SchedulerState::Scheduled => self.pending_interval_ms = Some(interval_ms),
        }
    }

    pub fn on_tick(&mut self, now_ms: u64) -> TickOutcome {
        if self.state == SchedulerState::Idle {
            return TickOutcome::Idle;
        }
        if self.in_flight {
            return TickOutcome::InFlight;
        }
        if let Some(last) = self.last_fire_ms {
            if now_ms.saturating_sub(last) < self.interval_ms {
                return TickOutcome::TooEarly;
            }
        }
        self.last_fire_ms = Some(now_ms);
        TickOutcome::Fire
    }

    /// Claim the in-flight slot. Returns false if it is already taken.
    pub fn begin_request(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish_request(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fires(scheduler: &mut CaptureScheduler, ticks: &[u64]) -> Vec<u64> {
        ticks
            .iter()
            .copied()
            .filter(|&t| {
                let fired = scheduler.on_tick(t) == TickOutcome::Fire;
                if fired {
                    assert!(scheduler.begin_request());
                    scheduler.finish_request();
                }
                fired
            })
            .collect()
    }

    #[test]
    fn idle_scheduler_never_fires() {
        let mut scheduler = CaptureScheduler::new(2_000);
        assert_eq!(scheduler.on_tick(0), TickOutcome::Idle);
        assert_eq!(scheduler.on_tick(10_000), TickOutcome::Idle);
    }

    #[test]
    fn early_ticks_are_dropped() {
        let mut scheduler = CaptureScheduler::new(2_000);
        scheduler.start();
        assert_eq!(fires(&mut scheduler, &[0, 1_900, 2_000, 4_050]), vec![0, 2_000, 4_050]);
    }

    #[test]
    fn steady_ticks_fire_once_per_interval() {
        let mut scheduler = CaptureScheduler::new(2_000);
        scheduler.start();
        let ticks: Vec<u64> = (0..=20_000).step_by(500).collect();
        let fired = fires(&mut scheduler, &ticks);
        assert_eq!(fired, (0..=20_000).step_by(2_000).collect::<Vec<u64>>());
    }

    #[test]
    fn ticks_during_a_request_are_dropped_not_deferred() {
        let mut scheduler = CaptureScheduler::new(2_000);
        scheduler.start();
        assert_eq!(scheduler.on_tick(0), TickOutcome::Fire);
        assert!(scheduler.begin_request());
        assert!(!scheduler.begin_request());

        assert_eq!(scheduler.on_tick(2_000), TickOutcome::InFlight);
        assert_eq!(scheduler.on_tick(4_000), TickOutcome::InFlight);
        scheduler.finish_request();

        // Nothing was queued while busy; the next tick simply fires.
        assert_eq!(scheduler.on_tick(4_500), TickOutcome::Fire);
        assert_eq!(scheduler.on_tick(5_000), TickOutcome::TooEarly);
    }

    #[test]
    fn stop_releases_the_guard() {
        let mut scheduler = CaptureScheduler::new(2_000);
        scheduler.start();
        scheduler.on_tick(0);
        scheduler.begin_request();
        scheduler.stop();
        assert!(!scheduler.in_flight());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.on_tick(2_000), TickOutcome::Idle);
    }

    #[test]
    fn interval_change_waits_for_restart() {
        let mut scheduler = CaptureScheduler::new(2_000);
        scheduler.start();
        assert_eq!(scheduler.on_tick(0), TickOutcome::Fire);

        scheduler.set_interval(5_000);
        assert_eq!(scheduler.interval_ms(), 2_000);
        assert_eq!(scheduler.on_tick(2_000), TickOutcome::Fire);

        scheduler.start();
        assert_eq!(scheduler.interval_ms(), 5_000);
        assert_eq!(scheduler.on_tick(3_000), TickOutcome::Fire);
        assert_eq!(scheduler.on_tick(7_000), TickOutcome::TooEarly);
        assert_eq!(scheduler.on_tick(8_000), TickOutcome::Fire);
    }

    #[test]
    fn interval_change_while_idle_is_immediate() {
        let mut scheduler = CaptureScheduler::new(2_000);
        scheduler.set_interval(3_000);
        assert_eq!(scheduler.interval_ms(), 3_000);
    }
}
