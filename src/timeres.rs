//! Time resolution for spoken time references.
//!
//! Converts an extracted time expression plus a reference "now" into a
//! concrete instant. Never fails: malformed or out-of-bounds references
//! fall back to `now`.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::action::TimeSource;

/// Meal-type keyword used as an implicit time reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

/// Default clock times for the meal-type keywords. Configurable: prompt
/// revisions in the wild disagree on half-hour offsets, so these are
/// constants of the deployment, not of the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealTimes {
    #[serde(default = "default_breakfast")]
    pub breakfast: NaiveTime,
    #[serde(default = "default_lunch")]
    pub lunch: NaiveTime,
    #[serde(default = "default_dinner")]
    pub dinner: NaiveTime,
    #[serde(default = "default_snack")]
    pub snack: NaiveTime,
}

fn at(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}
fn default_breakfast() -> NaiveTime {
    at(8)
}
fn default_lunch() -> NaiveTime {
    at(12)
}
fn default_dinner() -> NaiveTime {
    at(18)
}
fn default_snack() -> NaiveTime {
    at(15)
}

impl Default for MealTimes {
    fn default() -> Self {
        Self {
            breakfast: default_breakfast(),
            lunch: default_lunch(),
            dinner: default_dinner(),
            snack: default_snack(),
        }
    }
}

impl MealTimes {
    pub fn slot(&self, meal: MealSlot) -> NaiveTime {
        match meal {
            MealSlot::Breakfast => self.breakfast,
            MealSlot::Lunch => self.lunch,
            MealSlot::Dinner => self.dinner,
            MealSlot::Snack => self.snack,
        }
    }
}

/// A time reference associated with one action's span of the utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExpression {
    /// An explicit instant from upstream extraction ("at 2pm").
    Explicit(DateTime<Utc>),
    /// A meal-type keyword with no explicit time.
    Meal(MealSlot),
    /// "N minutes ago".
    MinutesAgo(i64),
    /// No time reference at all.
    None,
}

/// A resolved instant plus the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTime {
    pub instant: DateTime<Utc>,
    pub source: TimeSource,
}

/// Resolves time expressions against an injected "now".
#[derive(Debug, Clone)]
pub struct TimeResolver {
    meal_times: MealTimes,
    /// Reject explicit/relative results further in the past than this.
    max_past: Duration,
    /// Reject explicit/relative results further in the future than this.
    max_future: Duration,
}

impl Default for TimeResolver {
    fn default() -> Self {
        Self::new(MealTimes::default(), Duration::hours(24), Duration::hours(1))
    }
}

impl TimeResolver {
    pub fn new(meal_times: MealTimes, max_past: Duration, max_future: Duration) -> Self {
        Self {
            meal_times,
            max_past,
            max_future,
        }
    }

    /// Resolve a time expression against `now`. Always returns a valid
    /// instant; the worst case is `now` with `TimeSource::CurrentTime`.
    ///
    /// Explicit and relative results outside the past/future bounds fall
    /// back to `now` (hallucinated or malformed upstream timestamps).
    /// Meal slots always land on today's slot, even late at night: the
    /// user is describing something already eaten, so "breakfast" at 23:00
    /// means this morning, never tomorrow.
    pub fn resolve(&self, expression: &TimeExpression, now: DateTime<Utc>) -> ResolvedTime {
        match expression {
            TimeExpression::Explicit(instant) => {
                if self.within_bounds(*instant, now) {
                    ResolvedTime {
                        instant: *instant,
                        source: TimeSource::Explicit,
                    }
                } else {
                    debug!(%instant, %now, "explicit time outside bounds, falling back to now");
                    ResolvedTime {
                        instant: now,
                        source: TimeSource::CurrentTime,
                    }
                }
            }
            TimeExpression::Meal(slot) => {
                let instant = now
                    .date_naive()
                    .and_time(self.meal_times.slot(*slot))
                    .and_utc();
                ResolvedTime {
                    instant,
                    source: TimeSource::MealType,
                }
            }
            TimeExpression::MinutesAgo(minutes) => {
                let instant = now - Duration::minutes(*minutes);
                if self.within_bounds(instant, now) {
                    ResolvedTime {
                        instant,
                        source: TimeSource::Relative,
                    }
                } else {
                    debug!(minutes, "relative offset outside bounds, falling back to now");
                    ResolvedTime {
                        instant: now,
                        source: TimeSource::CurrentTime,
                    }
                }
            }
            TimeExpression::None => ResolvedTime {
                instant: now,
                source: TimeSource::CurrentTime,
            },
        }
    }

    fn within_bounds(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        instant >= now - self.max_past && instant <= now + self.max_future
    }
}
