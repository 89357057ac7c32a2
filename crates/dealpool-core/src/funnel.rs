//! Time-boxed registration funnel.
//!
//! Real-estate projects run a four-stage funnel; retail deals use a single
//! sales window. Both answer the same question for the admission controller:
//! is registration open at `now`? Deadline expiry is a derived, read-time
//! property; no timer or cron ever "closes" a stage.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{DealPoolError, Result, TimestampMs};

/// Funnel stage for real-estate group purchases. Advances strictly forward.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FunnelStage {
    PreRegistration,
    WebinarScheduled,
    FomoConfirmationWindow,
    RegistrationClosed,
}

impl FunnelStage {
    pub fn next(self) -> Option<FunnelStage> {
        match self {
            FunnelStage::PreRegistration => Some(FunnelStage::WebinarScheduled),
            FunnelStage::WebinarScheduled => Some(FunnelStage::FomoConfirmationWindow),
            FunnelStage::FomoConfirmationWindow => Some(FunnelStage::RegistrationClosed),
            FunnelStage::RegistrationClosed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FunnelStage::RegistrationClosed)
    }

    /// Stages during which join requests are accepted (deadline permitting).
    fn admits_registration(self) -> bool {
        matches!(
            self,
            FunnelStage::PreRegistration | FunnelStage::FomoConfirmationWindow
        )
    }
}

/// Optional deadline per time-boxed stage. A stage with no deadline stays
/// open until explicitly advanced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDeadlines {
    pub pre_registration: Option<TimestampMs>,
    pub webinar: Option<TimestampMs>,
    pub confirmation_window: Option<TimestampMs>,
}

impl StageDeadlines {
    fn for_stage(&self, stage: FunnelStage) -> Option<TimestampMs> {
        match stage {
            FunnelStage::PreRegistration => self.pre_registration,
            FunnelStage::WebinarScheduled => self.webinar,
            FunnelStage::FomoConfirmationWindow => self.confirmation_window,
            FunnelStage::RegistrationClosed => None,
        }
    }
}

/// Stage state machine for one project.
///
/// Invariants:
/// - starts in `PreRegistration`, ends in `RegistrationClosed`
/// - transitions are admin-triggered and strictly forward
/// - a passed deadline closes registration at read time even when no
///   transition was recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSchedule {
    current: FunnelStage,
    deadlines: StageDeadlines,
}

impl StageSchedule {
    pub fn new(deadlines: StageDeadlines) -> StageSchedule {
        StageSchedule {
            current: FunnelStage::PreRegistration,
            deadlines,
        }
    }

    pub fn current(&self) -> FunnelStage {
        self.current
    }

    pub fn deadlines(&self) -> &StageDeadlines {
        &self.deadlines
    }

    /// True when the current stage carries a deadline that has passed.
    /// The deadline instant itself counts as passed.
    pub fn is_expired(&self, now_ms: TimestampMs) -> bool {
        match self.deadlines.for_stage(self.current) {
            Some(deadline) => now_ms >= deadline,
            None => false,
        }
    }

    /// Admin-triggered forward transition.
    pub fn advance(&mut self) -> Result<FunnelStage> {
        let next = self.current.next().ok_or_else(|| {
            DealPoolError::InvalidInput("registration is already closed".into())
        })?;
        info!(from = ?self.current, to = ?next, "funnel stage advanced");
        self.current = next;
        Ok(next)
    }

    /// The single registration-gate predicate: open only during
    /// `PreRegistration` and `FomoConfirmationWindow` whose deadline (if
    /// set) has not passed.
    pub fn is_registration_open(&self, now_ms: TimestampMs) -> bool {
        self.current.admits_registration() && !self.is_expired(now_ms)
    }
}

/// Retail two-state variant: open until `ends_at`, else closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesWindow {
    pub ends_at: Option<TimestampMs>,
}

impl SalesWindow {
    pub fn until(ends_at: TimestampMs) -> SalesWindow {
        SalesWindow {
            ends_at: Some(ends_at),
        }
    }

    pub fn is_open(&self, now_ms: TimestampMs) -> bool {
        match self.ends_at {
            Some(end) => now_ms < end,
            None => true,
        }
    }
}

/// Registration gate for either deal kind, so the admission controller
/// consults exactly one predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    Retail(SalesWindow),
    Funnel(StageSchedule),
}

impl Schedule {
    pub fn is_registration_open(&self, now_ms: TimestampMs) -> bool {
        match self {
            Schedule::Retail(window) => window.is_open(now_ms),
            Schedule::Funnel(schedule) => schedule.is_registration_open(now_ms),
        }
    }

    /// Forward the funnel; an error for retail deals, which have no stages.
    pub fn advance_stage(&mut self) -> Result<FunnelStage> {
        match self {
            Schedule::Retail(_) => Err(DealPoolError::InvalidInput(
                "retail deals have no funnel stages".into(),
            )),
            Schedule::Funnel(schedule) => schedule.advance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funnel_with_deadlines() -> StageSchedule {
        StageSchedule::new(StageDeadlines {
            pre_registration: Some(1_000),
            webinar: Some(2_000),
            confirmation_window: Some(3_000),
        })
    }

    #[test]
    fn stages_advance_strictly_forward() {
        let mut s = StageSchedule::new(StageDeadlines::default());
        assert_eq!(s.current(), FunnelStage::PreRegistration);
        assert_eq!(s.advance().unwrap(), FunnelStage::WebinarScheduled);
        assert_eq!(s.advance().unwrap(), FunnelStage::FomoConfirmationWindow);
        assert_eq!(s.advance().unwrap(), FunnelStage::RegistrationClosed);
        assert!(s.advance().is_err());
    }

    #[test]
    fn open_only_during_registration_stages() {
        let mut s = StageSchedule::new(StageDeadlines::default());
        assert!(s.is_registration_open(0));
        s.advance().unwrap(); // webinar
        assert!(!s.is_registration_open(0));
        s.advance().unwrap(); // confirmation window
        assert!(s.is_registration_open(0));
        s.advance().unwrap(); // closed
        assert!(!s.is_registration_open(0));
    }

    #[test]
    fn passed_deadline_closes_without_transition() {
        let s = funnel_with_deadlines();
        assert!(s.is_registration_open(999));
        assert!(!s.is_registration_open(1_000));
        assert!(!s.is_registration_open(5_000));
        // stored stage unchanged; closure is derived at read time
        assert_eq!(s.current(), FunnelStage::PreRegistration);
    }

    #[test]
    fn confirmation_window_deadline_is_honored() {
        let mut s = funnel_with_deadlines();
        s.advance().unwrap();
        s.advance().unwrap();
        assert_eq!(s.current(), FunnelStage::FomoConfirmationWindow);
        assert!(s.is_registration_open(2_999));
        assert!(!s.is_registration_open(3_000));
    }

    #[test]
    fn missing_deadline_keeps_stage_open() {
        let s = StageSchedule::new(StageDeadlines::default());
        assert!(s.is_registration_open(i64::MAX));
    }

    #[test]
    fn sales_window_closes_at_end_time() {
        let w = SalesWindow::until(10_000);
        assert!(w.is_open(9_999));
        assert!(!w.is_open(10_000));
        assert!(SalesWindow::default().is_open(i64::MAX));
    }

    #[test]
    fn retail_schedule_has_no_stages() {
        let mut s = Schedule::Retail(SalesWindow::until(10));
        assert!(s.advance_stage().is_err());
        assert!(s.is_registration_open(5));
        assert!(!s.is_registration_open(10));
    }
}
