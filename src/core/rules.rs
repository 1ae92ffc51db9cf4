//! Points rule engine - Pure tier, window and redemption calculations.
//!
//! Nothing in this module touches storage or reads the clock: every function
//! takes the evaluation time explicitly, so the aggregator and the refresh sweep
//! get identical answers for identical inputs.
//!
//! Active points live in consecutive, non-overlapping 365-day windows anchored
//! at the account's subscription date. Only points earned inside the window
//! containing the evaluation time count; everything else is history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::account_entry;
use crate::errors::{Error, Result};

/// Minimum block of points that can be redeemed at once.
pub const REDEMPTION_UNIT: i64 = 500;
/// Points exchanged for one currency unit.
pub const POINTS_PER_CURRENCY_UNIT: i64 = 50;
/// Length of one active-points window.
pub const WINDOW_DAYS: i64 = 365;
/// Largest purchase amount accepted. Keeps every points total well inside `i64`.
pub const MAX_AMOUNT: f64 = 1e12;

/// Loyalty tier, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// No qualifying history
    Base,
    /// 3+ purchases or 500+ spent
    Intermediate,
    /// 8+ purchases or 1500+ spent
    Advanced,
    /// 13+ purchases or 3000+ spent
    Pro,
}

impl Tier {
    /// Every tier, lowest first.
    pub const ALL: [Self; 4] = [Self::Base, Self::Intermediate, Self::Advanced, Self::Pro];

    /// The token stored in the database and shown to callers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "Base",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
            Self::Pro => "Pro",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| Error::Validation {
                message: format!("Unknown tier '{s}'"),
            })
    }
}

/// Spend and purchase-count thresholds for one tier. Either one alone promotes.
struct TierThreshold {
    tier: Tier,
    min_spend: f64,
    min_purchases: i64,
}

// Highest first: the first match wins.
const TIER_THRESHOLDS: [TierThreshold; 3] = [
    TierThreshold {
        tier: Tier::Pro,
        min_spend: 3000.0,
        min_purchases: 13,
    },
    TierThreshold {
        tier: Tier::Advanced,
        min_spend: 1500.0,
        min_purchases: 8,
    },
    TierThreshold {
        tier: Tier::Intermediate,
        min_spend: 500.0,
        min_purchases: 3,
    },
];

/// Classifies a customer from lifetime purchase count and lifetime spend.
#[must_use]
pub fn classify_tier(purchases: i64, spend: f64) -> Tier {
    TIER_THRESHOLDS
        .iter()
        .find(|threshold| spend >= threshold.min_spend || purchases >= threshold.min_purchases)
        .map_or(Tier::Base, |threshold| threshold.tier)
}

/// Points earned for a purchase: one point per whole currency unit.
///
/// Negative, NaN and infinite amounts earn nothing.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn points_for_amount(amount: f64) -> i64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    amount.trunc() as i64
}

/// A dated points record fed to [`active_points`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPoint {
    /// When the points were earned
    pub date: DateTime<Utc>,
    /// How many points were earned
    pub points: i64,
}

impl From<&account_entry::Model> for HistoryPoint {
    fn from(entry: &account_entry::Model) -> Self {
        Self {
            date: entry.date,
            points: entry.points_awarded,
        }
    }
}

/// One 365-day active-points window, half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointsWindow {
    /// Zero-based window number counted from the subscription date
    pub index: i64,
    /// First instant inside the window
    pub start: DateTime<Utc>,
    /// First instant after the window
    pub end: DateTime<Utc>,
}

impl PointsWindow {
    /// Whether `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start <= date && date < self.end
    }
}

/// Finds the window containing `now`.
///
/// Evaluation times before the subscription date map to the first window.
#[must_use]
pub fn current_window(subscription_date: DateTime<Utc>, now: DateTime<Utc>) -> PointsWindow {
    let elapsed_days = (now - subscription_date).num_days();
    let index = (elapsed_days / WINDOW_DAYS).max(0);
    let start = subscription_date + Duration::days(WINDOW_DAYS * index);
    let end = start + Duration::days(WINDOW_DAYS);
    PointsWindow { index, start, end }
}

/// Sums the points earned inside the window containing `now`.
#[must_use]
pub fn active_points(
    history: &[HistoryPoint],
    subscription_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> i64 {
    let window = current_window(subscription_date, now);
    history
        .iter()
        .filter(|point| window.contains(point.date))
        .fold(0, |total, point| total.saturating_add(point.points))
}

/// Points ready for redemption and their currency value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Redemption {
    /// Active points rounded down to a multiple of [`REDEMPTION_UNIT`]
    pub points: i64,
    /// `points / POINTS_PER_CURRENCY_UNIT`
    pub amount: f64,
}

/// Rounds active points down to whole redemption units and prices them.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn redemption(active_points: i64) -> Redemption {
    if active_points < REDEMPTION_UNIT {
        return Redemption {
            points: 0,
            amount: 0.0,
        };
    }

    let points = (active_points / REDEMPTION_UNIT) * REDEMPTION_UNIT;
    Redemption {
        points,
        amount: points as f64 / POINTS_PER_CURRENCY_UNIT as f64,
    }
}
