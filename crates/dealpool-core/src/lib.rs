//! Group-buy pricing and admission engine.
//!
//! A price for a deal starts high and drops in discrete steps as more
//! participants join; each participant's final price additionally depends on
//! where they landed inside the active discount tier. This crate computes
//! tier membership, position-dependent prices, the platform/supplier revenue
//! split, and admit/waitlist/reject decisions, and gates admission behind a
//! time-boxed registration funnel.
//!
//! Design goals:
//! - Invalid states unrepresentable (validated value types + constructors)
//! - Deterministic, bounded integer arithmetic (u128 intermediates)
//! - Fail-closed on malformed inputs
//! - IO-free except for the `DealStore` seam; callers provide storage and time

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod admission;
pub mod commission;
pub mod config;
pub mod deal;
pub mod funnel;
pub mod math;
pub mod metrics;
pub mod pricing;
pub mod tier;

pub use admission::{
    AdmissionController, AdmissionResult, DealProgress, DealStore, InMemoryDealStore, JoinRequest,
    RejectReason,
};
pub use commission::CommissionSplit;
pub use config::EngineConfig;
pub use deal::{AdmissionStatus, Deal, Registration};
pub use funnel::{FunnelStage, SalesWindow, Schedule, StageDeadlines, StageSchedule};
pub use pricing::{PositionSpread, TierPriceSummary};
pub use tier::{Tier, TierTable};

/// Milliseconds since the Unix epoch. All deadlines and join times use this.
pub type TimestampMs = i64;

pub const BPS_U16: u16 = 10_000;
pub const BPS_U64: u64 = 10_000;

/// Identifier of a deal/project, assigned by the owning storage layer.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DealId(pub u64);

/// Identifier of a joining participant (authenticated upstream, opaque here).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParticipantId(pub u64);

/// Monetary amount in whole units of the deal's base currency.
///
/// The engine never produces fractional minor units; every computation rounds
/// half up to a whole unit (see `math`).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn new(v: u64) -> Money {
        Money(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Basis points in `[0, 10_000]` (correct-by-construction).
///
/// Percentages enter the engine as bps: an 18% discount is `Bps(1_800)`, the
/// 2.5% position adjustment is `Bps(250)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct Bps(u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const MAX: Bps = Bps(BPS_U16);

    /// Constructs a bounded bps value.
    ///
    /// Preconditions:
    /// - `v <= 10_000` (else returns an error; fail-closed).
    ///
    /// Postconditions:
    /// - `self.get()` is always in `[0, 10_000]` and can be used without re-checking.
    pub fn new(v: u16) -> Result<Bps> {
        if v <= BPS_U16 {
            Ok(Bps(v))
        } else {
            Err(DealPoolError::InvalidInput(format!(
                "bps out of range: {v} > {BPS_U16}"
            )))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

impl TryFrom<u16> for Bps {
    type Error = DealPoolError;
    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Bps::new(value)
    }
}

impl From<Bps> for u16 {
    fn from(value: Bps) -> u16 {
        value.0
    }
}

/// Unified error type for engine operations.
///
/// Capacity exhaustion and closed registration stages are deliberately NOT
/// errors: they are expected business outcomes surfaced as
/// [`admission::AdmissionResult`] variants that callers must branch on.
#[derive(Debug, Error)]
pub enum DealPoolError {
    // Authoring-time validation (tier tables, deal parameters, engine config)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Fail-closed argument validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bounded value exceeded: {0}")]
    BoundedValueExceeded(String),

    // Storage seam errors
    #[error("Deal not found: {0:?}")]
    DealNotFound(DealId),

    #[error("Registration not found: deal {deal_id:?}, position {position}")]
    RegistrationNotFound { deal_id: DealId, position: u32 },

    /// Two admissions raced for the same sequence slot at the storage layer.
    /// Retried once by the controller; surfaced as transient if the retry
    /// also conflicts.
    #[error("Concurrent admission conflict on deal {0:?}")]
    ConcurrencyConflict(DealId),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, DealPoolError>;
