//! Capacity-gated admission.
//!
//! The only stateful, concurrency-sensitive component. The per-deal position
//! counter lives behind the [`DealStore`] seam as an atomic
//! increment-and-return sequence; no two concurrent admissions for the same
//! deal may observe the same pre-increment rank. Everything downstream of the
//! rank (tier resolution, pricing, commission) is pure.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::commission::{self, CommissionSplit};
use crate::config::EngineConfig;
use crate::deal::{AdmissionStatus, Deal, Registration};
use crate::metrics::EngineMetrics;
use crate::pricing;
use crate::tier::Tier;
use crate::{DealId, DealPoolError, Money, ParticipantId, Result, TimestampMs};

/// A join attempt. `requested_at_ms` is the caller's wall clock; it drives
/// both the registration gate and the recorded join time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub participant_id: ParticipantId,
    pub quantity: u32,
    pub requested_at_ms: TimestampMs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    StageClosed,
    CapacityExceeded,
}

/// Outcome of one join attempt. Callers must branch on the variant: a
/// waitlisted or rejected join never silently succeeds at a wrong price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionResult {
    Confirmed {
        /// 1-based global position in the deal.
        position: u32,
        tier: Tier,
        price: Money,
        commission: CommissionSplit,
    },
    WaitingList {
        /// Global position; the queue continues across the capacity line.
        position: u32,
        /// Display position within the waiting list (1-based).
        waitlist_position: u32,
    },
    Rejected {
        reason: RejectReason,
    },
}

/// Live registration counts for one deal. `confirmed` and `waitlisted`
/// exclude cancelled registrations; cancellation moves a registration out of
/// them without freeing its position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionCounts {
    pub confirmed: u32,
    pub waitlisted: u32,
    pub cancelled: u32,
}

/// Storage seam for admission state.
///
/// `next_rank` is the transactional boundary: implementations must behave as
/// a linearizable increment-and-return sequence per deal (a transactional
/// `UPDATE ... RETURNING`, a per-deal mutex, or similar). An implementation
/// that detects a write race returns [`DealPoolError::ConcurrencyConflict`];
/// the controller retries once with the same request.
pub trait DealStore: Send + Sync {
    /// Atomically increment the deal's admission counter and return the
    /// pre-increment value (the candidate's zero-based rank).
    fn next_rank(&self, deal_id: DealId) -> Result<u64>;

    /// Persist a registration. Never called for rejected attempts.
    fn record_registration(&self, registration: Registration) -> Result<()>;

    /// Mark a registration cancelled. Affects occupancy counts only; the
    /// position number stays burned.
    fn cancel_registration(&self, deal_id: DealId, position: u32) -> Result<()>;

    /// Live counts for the deal. A deal with no admissions yet reports all
    /// zeros.
    fn counts(&self, deal_id: DealId) -> Result<AdmissionCounts>;
}

/// Reference `DealStore`: linearizable by a process-wide write lock.
///
/// Suitable for tests and single-process deployments; production callers
/// implement [`DealStore`] against their transactional storage.
#[derive(Debug, Default)]
pub struct InMemoryDealStore {
    rows: RwLock<HashMap<DealId, DealRow>>,
}

#[derive(Debug, Default)]
struct DealRow {
    next_rank: u64,
    registrations: Vec<Registration>,
    cancelled: HashSet<u32>,
}

impl InMemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All registrations recorded for a deal, in admission order.
    pub fn registrations(&self, deal_id: DealId) -> Result<Vec<Registration>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| DealPoolError::StorageError("deal store lock poisoned".into()))?;
        let row = rows
            .get(&deal_id)
            .ok_or(DealPoolError::DealNotFound(deal_id))?;
        Ok(row.registrations.clone())
    }
}

impl DealStore for InMemoryDealStore {
    fn next_rank(&self, deal_id: DealId) -> Result<u64> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DealPoolError::StorageError("deal store lock poisoned".into()))?;
        let row = rows.entry(deal_id).or_default();
        let rank = row.next_rank;
        row.next_rank += 1;
        Ok(rank)
    }

    fn record_registration(&self, registration: Registration) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DealPoolError::StorageError("deal store lock poisoned".into()))?;
        let row = rows
            .get_mut(&registration.deal_id)
            .ok_or(DealPoolError::DealNotFound(registration.deal_id))?;
        if row
            .registrations
            .iter()
            .any(|r| r.position == registration.position)
        {
            return Err(DealPoolError::StorageError(format!(
                "duplicate position {} for deal {:?}",
                registration.position, registration.deal_id
            )));
        }
        row.registrations.push(registration);
        Ok(())
    }

    fn cancel_registration(&self, deal_id: DealId, position: u32) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DealPoolError::StorageError("deal store lock poisoned".into()))?;
        let row = rows
            .get_mut(&deal_id)
            .ok_or(DealPoolError::DealNotFound(deal_id))?;
        if !row.registrations.iter().any(|r| r.position == position) {
            return Err(DealPoolError::RegistrationNotFound { deal_id, position });
        }
        if !row.cancelled.insert(position) {
            return Err(DealPoolError::InvalidInput(format!(
                "registration at position {position} is already cancelled"
            )));
        }
        Ok(())
    }

    fn counts(&self, deal_id: DealId) -> Result<AdmissionCounts> {
        let rows = self
            .rows
            .read()
            .map_err(|_| DealPoolError::StorageError("deal store lock poisoned".into()))?;
        let Some(row) = rows.get(&deal_id) else {
            return Ok(AdmissionCounts::default());
        };
        let mut counts = AdmissionCounts::default();
        for r in &row.registrations {
            if row.cancelled.contains(&r.position) {
                counts.cancelled += 1;
                continue;
            }
            match r.status {
                AdmissionStatus::Confirmed => counts.confirmed += 1,
                AdmissionStatus::WaitingList => counts.waitlisted += 1,
            }
        }
        Ok(counts)
    }
}

/// Display view of a deal's fill state. Computed, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealProgress {
    /// Confirmed, non-cancelled registrations (the effective occupied count).
    pub occupied: u32,
    pub waitlisted: u32,
    pub cancelled: u32,
    /// Index into the deal's tier table for the currently displayed tier.
    pub active_tier: usize,
    pub target_participants: u32,
    pub target_reached: bool,
}

/// Serializes join requests against the store's position sequence and turns
/// ranks into admission outcomes.
pub struct AdmissionController<S: DealStore> {
    store: Arc<S>,
    config: EngineConfig,
    metrics: EngineMetrics,
}

impl<S: DealStore> AdmissionController<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            metrics: EngineMetrics::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Decide admission for one join request.
    ///
    /// Postconditions:
    /// - positions across calls for the same deal are strictly increasing
    ///   and never reused
    /// - at most `total_capacity` confirmed and `waiting_list_capacity`
    ///   waitlisted registrations ever exist
    /// - rejected attempts write nothing
    pub fn admit(&self, deal: &Deal, request: &JoinRequest) -> Result<AdmissionResult> {
        if request.quantity == 0 {
            return Err(DealPoolError::InvalidInput(
                "join quantity must be >= 1".into(),
            ));
        }
        if !deal.is_registration_open(request.requested_at_ms) {
            self.metrics.rejections_stage_closed.inc();
            debug!(deal_id = deal.id.0, "join rejected: registration closed");
            return Ok(AdmissionResult::Rejected {
                reason: RejectReason::StageClosed,
            });
        }

        let rank = self.next_rank_with_retry(deal.id)?;
        let position = u32::try_from(rank + 1).map_err(|_| {
            DealPoolError::BoundedValueExceeded(format!("position overflow on deal {:?}", deal.id))
        })?;

        if rank < deal.total_capacity as u64 {
            let tier = *deal.tiers.resolve(position);
            let position_in_tier = position - tier.min_participants + 1;
            let price = pricing::price_for_position(
                &tier,
                deal.original_price,
                position_in_tier,
                self.config.position_spread,
            )?;
            let commission = commission::split_for(price, &tier, deal, &self.config)?;
            self.store.record_registration(Registration {
                participant_id: request.participant_id,
                deal_id: deal.id,
                position,
                status: AdmissionStatus::Confirmed,
                price_paid: Some(price),
                quantity: request.quantity,
                joined_at_ms: request.requested_at_ms,
            })?;
            self.metrics.admissions_confirmed.inc();
            debug!(
                deal_id = deal.id.0,
                position,
                price = price.get(),
                "join confirmed"
            );
            Ok(AdmissionResult::Confirmed {
                position,
                tier,
                price,
                commission,
            })
        } else if rank - (deal.total_capacity as u64) < deal.waiting_list_capacity as u64 {
            self.store.record_registration(Registration {
                participant_id: request.participant_id,
                deal_id: deal.id,
                position,
                status: AdmissionStatus::WaitingList,
                price_paid: None,
                quantity: request.quantity,
                joined_at_ms: request.requested_at_ms,
            })?;
            self.metrics.admissions_waitlisted.inc();
            let waitlist_position = position - deal.total_capacity;
            debug!(
                deal_id = deal.id.0,
                position, waitlist_position, "join waitlisted"
            );
            Ok(AdmissionResult::WaitingList {
                position,
                waitlist_position,
            })
        } else {
            self.metrics.rejections_capacity.inc();
            debug!(deal_id = deal.id.0, "join rejected: capacity exceeded");
            Ok(AdmissionResult::Rejected {
                reason: RejectReason::CapacityExceeded,
            })
        }
    }

    /// Cancel a registration. The effective occupied count drops; the
    /// position number stays burned and the sequence is untouched.
    pub fn cancel(&self, deal_id: DealId, position: u32) -> Result<()> {
        self.store.cancel_registration(deal_id, position)?;
        self.metrics.cancellations.inc();
        debug!(deal_id = deal_id.0, position, "registration cancelled");
        Ok(())
    }

    /// Fill state for display. The active tier follows the effective
    /// occupied count, so cancellations can move it back.
    pub fn progress(&self, deal: &Deal) -> Result<DealProgress> {
        let counts = self.store.counts(deal.id)?;
        let (active_tier, _) = deal.tiers.resolve_indexed(counts.confirmed);
        Ok(DealProgress {
            occupied: counts.confirmed,
            waitlisted: counts.waitlisted,
            cancelled: counts.cancelled,
            active_tier,
            target_participants: deal.target_participants,
            target_reached: counts.confirmed >= deal.target_participants,
        })
    }

    fn next_rank_with_retry(&self, deal_id: DealId) -> Result<u64> {
        let mut attempts = 0u32;
        loop {
            match self.store.next_rank(deal_id) {
                Err(DealPoolError::ConcurrencyConflict(id))
                    if attempts < self.config.conflict_retries =>
                {
                    attempts += 1;
                    self.metrics.sequence_conflicts.inc();
                    warn!(
                        deal_id = id.0,
                        attempt = attempts,
                        "admission sequence conflict, retrying"
                    );
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::{SalesWindow, Schedule, StageDeadlines, StageSchedule};
    use crate::tier::TierTable;
    use crate::Bps;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn bps(v: u16) -> Bps {
        Bps::new(v).unwrap()
    }

    fn table() -> TierTable {
        TierTable::new(vec![
            Tier::new(1, 2, bps(0)).unwrap(),
            Tier::new(3, 5, bps(1_000)).unwrap(),
        ])
        .unwrap()
    }

    fn retail_deal(total: u32, waitlist: u32) -> Deal {
        Deal::new(
            DealId(7),
            Money::new(1_000),
            table(),
            total.min(3).max(1),
            total,
            waitlist,
            None,
            Schedule::Retail(SalesWindow::default()),
        )
        .unwrap()
    }

    fn request(participant: u64) -> JoinRequest {
        JoinRequest {
            participant_id: ParticipantId(participant),
            quantity: 1,
            requested_at_ms: 0,
        }
    }

    fn controller() -> AdmissionController<InMemoryDealStore> {
        AdmissionController::new(Arc::new(InMemoryDealStore::new()))
    }

    #[test]
    fn positions_are_strictly_increasing() {
        let deal = retail_deal(5, 0);
        let ctl = controller();
        let mut last = 0;
        for i in 0..5 {
            match ctl.admit(&deal, &request(i)).unwrap() {
                AdmissionResult::Confirmed { position, .. } => {
                    assert!(position > last);
                    last = position;
                }
                other => panic!("expected confirmation, got {other:?}"),
            }
        }
    }

    #[test]
    fn confirmed_price_follows_tier_and_position() {
        let deal = retail_deal(5, 0);
        let ctl = controller();

        // tier 1..2 at 0%: nominal 1000, first pays 975
        match ctl.admit(&deal, &request(1)).unwrap() {
            AdmissionResult::Confirmed { price, tier, .. } => {
                assert_eq!(tier.min_participants, 1);
                assert_eq!(price, Money::new(975));
            }
            other => panic!("unexpected {other:?}"),
        }
        // second (last of tier 1) pays 1025
        match ctl.admit(&deal, &request(2)).unwrap() {
            AdmissionResult::Confirmed { price, .. } => assert_eq!(price, Money::new(1_025)),
            other => panic!("unexpected {other:?}"),
        }
        // third opens tier 3..5 at 10%: nominal 900, first pays 878
        match ctl.admit(&deal, &request(3)).unwrap() {
            AdmissionResult::Confirmed { price, tier, .. } => {
                assert_eq!(tier.min_participants, 3);
                assert_eq!(price, Money::new(878));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn waitlist_then_reject_after_capacity() {
        let deal = retail_deal(2, 2);
        let ctl = controller();

        assert!(matches!(
            ctl.admit(&deal, &request(1)).unwrap(),
            AdmissionResult::Confirmed { .. }
        ));
        assert!(matches!(
            ctl.admit(&deal, &request(2)).unwrap(),
            AdmissionResult::Confirmed { .. }
        ));
        match ctl.admit(&deal, &request(3)).unwrap() {
            AdmissionResult::WaitingList {
                position,
                waitlist_position,
            } => {
                assert_eq!(position, 3);
                assert_eq!(waitlist_position, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        match ctl.admit(&deal, &request(4)).unwrap() {
            AdmissionResult::WaitingList {
                waitlist_position, ..
            } => assert_eq!(waitlist_position, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            ctl.admit(&deal, &request(5)).unwrap(),
            AdmissionResult::Rejected {
                reason: RejectReason::CapacityExceeded
            }
        ));

        let snap = ctl.metrics().snapshot();
        assert_eq!(snap.admissions_confirmed, 2);
        assert_eq!(snap.admissions_waitlisted, 2);
        assert_eq!(snap.rejections_capacity, 1);
    }

    #[test]
    fn closed_stage_rejects_without_consuming_a_position() {
        let mut schedule = StageSchedule::new(StageDeadlines::default());
        schedule.advance().unwrap(); // webinar: closed for registration
        let deal = Deal::new(
            DealId(9),
            Money::new(1_000),
            table(),
            1,
            5,
            0,
            None,
            Schedule::Funnel(schedule),
        )
        .unwrap();
        let ctl = controller();

        assert!(matches!(
            ctl.admit(&deal, &request(1)).unwrap(),
            AdmissionResult::Rejected {
                reason: RejectReason::StageClosed
            }
        ));
        // the rejected attempt did not touch the sequence: a deal row was
        // never created
        assert!(ctl.store().registrations(DealId(9)).is_err());
        assert_eq!(ctl.metrics().snapshot().rejections_stage_closed, 1);
    }

    #[test]
    fn cancellation_frees_occupancy_but_not_positions() {
        let deal = retail_deal(5, 0);
        let ctl = controller();
        for i in 0..3 {
            ctl.admit(&deal, &request(i)).unwrap();
        }
        ctl.cancel(deal.id, 2).unwrap();

        let progress = ctl.progress(&deal).unwrap();
        assert_eq!(progress.occupied, 2);
        assert_eq!(progress.cancelled, 1);

        // next join still gets position 4
        match ctl.admit(&deal, &request(10)).unwrap() {
            AdmissionResult::Confirmed { position, .. } => assert_eq!(position, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancel_of_unknown_position_fails() {
        let deal = retail_deal(5, 0);
        let ctl = controller();
        ctl.admit(&deal, &request(1)).unwrap();
        assert!(matches!(
            ctl.cancel(deal.id, 42),
            Err(DealPoolError::RegistrationNotFound { .. })
        ));
        ctl.cancel(deal.id, 1).unwrap();
        assert!(ctl.cancel(deal.id, 1).is_err());
    }

    #[test]
    fn progress_tracks_active_tier_and_target() {
        let deal = retail_deal(5, 0);
        let ctl = controller();
        for i in 0..3 {
            ctl.admit(&deal, &request(i)).unwrap();
        }
        let progress = ctl.progress(&deal).unwrap();
        assert_eq!(progress.occupied, 3);
        assert_eq!(progress.active_tier, 1);
        assert!(progress.target_reached);
    }

    /// Store that injects sequence conflicts for the first N calls.
    struct ConflictingStore {
        inner: InMemoryDealStore,
        conflicts_left: AtomicU32,
    }

    impl ConflictingStore {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: InMemoryDealStore::new(),
                conflicts_left: AtomicU32::new(conflicts),
            }
        }
    }

    impl DealStore for ConflictingStore {
        fn next_rank(&self, deal_id: DealId) -> Result<u64> {
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_ok()
            {
                return Err(DealPoolError::ConcurrencyConflict(deal_id));
            }
            self.inner.next_rank(deal_id)
        }

        fn record_registration(&self, registration: Registration) -> Result<()> {
            self.inner.record_registration(registration)
        }

        fn cancel_registration(&self, deal_id: DealId, position: u32) -> Result<()> {
            self.inner.cancel_registration(deal_id, position)
        }

        fn counts(&self, deal_id: DealId) -> Result<AdmissionCounts> {
            self.inner.counts(deal_id)
        }
    }

    #[test]
    fn single_conflict_is_retried() {
        let deal = retail_deal(5, 0);
        let ctl = AdmissionController::new(Arc::new(ConflictingStore::new(1)));
        assert!(matches!(
            ctl.admit(&deal, &request(1)).unwrap(),
            AdmissionResult::Confirmed { position: 1, .. }
        ));
        assert_eq!(ctl.metrics().snapshot().sequence_conflicts, 1);
    }

    #[test]
    fn repeated_conflict_surfaces_as_transient() {
        let deal = retail_deal(5, 0);
        let ctl = AdmissionController::new(Arc::new(ConflictingStore::new(2)));
        assert!(matches!(
            ctl.admit(&deal, &request(1)),
            Err(DealPoolError::ConcurrencyConflict(_))
        ));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let deal = retail_deal(5, 0);
        let ctl = controller();
        let bad = JoinRequest {
            participant_id: ParticipantId(1),
            quantity: 0,
            requested_at_ms: 0,
        };
        assert!(ctl.admit(&deal, &bad).is_err());
    }
}
