//! Time periods.
//!
//! A [`FixedPeriod`] is a deterministic function of a reference timestamp and
//! an anchor policy, so it can key caches and persistent storage. A
//! [`FloatingPeriod`] trails the shared clock and drifts continuously; it is
//! never stored.

use crate::domain::clock::{printable_ts, Clock};
use crate::domain::error::HorseError;
use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};
use std::sync::Arc;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodKind {
    Week1,
    Day1,
    Hour12,
    Hour6,
    Hour3,
    Hour1,
    Min30,
    Min15,
    Min10,
    Min5,
    Min1,
}

impl PeriodKind {
    pub fn period_sec(self) -> i64 {
        match self {
            PeriodKind::Week1 => 7 * DAY,
            PeriodKind::Day1 => DAY,
            PeriodKind::Hour12 => 12 * HOUR,
            PeriodKind::Hour6 => 6 * HOUR,
            PeriodKind::Hour3 => 3 * HOUR,
            PeriodKind::Hour1 => HOUR,
            PeriodKind::Min30 => 30 * MINUTE,
            PeriodKind::Min15 => 15 * MINUTE,
            PeriodKind::Min10 => 10 * MINUTE,
            PeriodKind::Min5 => 5 * MINUTE,
            PeriodKind::Min1 => MINUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PeriodKind::Week1 => "1Week",
            PeriodKind::Day1 => "1Day",
            PeriodKind::Hour12 => "12Hour",
            PeriodKind::Hour6 => "6Hour",
            PeriodKind::Hour3 => "3Hour",
            PeriodKind::Hour1 => "1Hour",
            PeriodKind::Min30 => "30Min",
            PeriodKind::Min15 => "15Min",
            PeriodKind::Min10 => "10Min",
            PeriodKind::Min5 => "5Min",
            PeriodKind::Min1 => "1Min",
        }
    }
}

/// Where the left-hand boundary of a fixed period is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    /// Calendar-aligned: midnight for days and weeks, multiples of the period
    /// length within the day otherwise.
    #[default]
    Calendar,
    /// Start on the hour enclosing the reference timestamp.
    HourLhs,
    /// Start on the ten-minute mark enclosing the reference timestamp.
    TenMinLhs,
}

/// A half-open window `[lhs_ts, rhs_ts)` of one [`PeriodKind`].
///
/// Equality and hashing use only the kind and `lhs_ts`; the anchor is carried
/// along so that offsets keep the caller's boundary policy.
#[derive(Debug, Clone, Copy)]
pub struct FixedPeriod {
    kind: PeriodKind,
    anchor: Anchor,
    lhs_ts: i64,
}

impl FixedPeriod {
    pub fn new(kind: PeriodKind, around_ts: f64, anchor: Anchor) -> Result<Self, HorseError> {
        let (lhs_ts, _) = bound_timestamps(kind, around_ts, anchor)?;
        Ok(Self {
            kind,
            anchor,
            lhs_ts,
        })
    }

    /// Calendar-anchored period enclosing `ts`.
    pub fn around(kind: PeriodKind, ts: f64) -> Result<Self, HorseError> {
        Self::new(kind, ts, Anchor::Calendar)
    }

    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn period_sec(&self) -> i64 {
        self.kind.period_sec()
    }

    pub fn lhs_ts(&self) -> i64 {
        self.lhs_ts
    }

    pub fn rhs_ts(&self) -> i64 {
        self.lhs_ts + self.period_sec()
    }

    pub fn contains_ts(&self, ts: f64) -> bool {
        self.lhs_ts as f64 <= ts && ts < self.rhs_ts() as f64
    }

    /// Whether `other` lies wholly inside this window. Both are half-open, so
    /// sharing the right edge still nests: a day contains its last hour.
    pub fn contains_period(&self, other: &FixedPeriod) -> bool {
        self.lhs_ts <= other.lhs_ts && other.rhs_ts() <= self.rhs_ts()
    }

    /// The period of the same kind `n` whole periods later (earlier if `n` is
    /// negative). `p.offset(0) == p`.
    pub fn offset(&self, n: i64) -> FixedPeriod {
        FixedPeriod {
            kind: self.kind,
            anchor: self.anchor,
            lhs_ts: self.lhs_ts + n * self.period_sec(),
        }
    }
}

impl PartialEq for FixedPeriod {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.lhs_ts == other.lhs_ts
    }
}

impl Eq for FixedPeriod {}

impl Hash for FixedPeriod {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.lhs_ts.hash(state);
    }
}

impl Add<i64> for FixedPeriod {
    type Output = FixedPeriod;

    fn add(self, n: i64) -> FixedPeriod {
        self.offset(n)
    }
}

impl Sub<i64> for FixedPeriod {
    type Output = FixedPeriod;

    fn sub(self, n: i64) -> FixedPeriod {
        self.offset(-n)
    }
}

impl fmt::Display for FixedPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<FixedPeriod_{} from {}>",
            self.kind.name(),
            printable_ts(self.lhs_ts as f64)
        )
    }
}

fn bound_timestamps(kind: PeriodKind, ref_ts: f64, anchor: Anchor) -> Result<(i64, i64), HorseError> {
    let secs = ref_ts.floor() as i64;
    let dt = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| HorseError::InvalidPeriod {
            reason: format!("timestamp {ref_ts} is out of range"),
        })?
        .naive_utc();
    let hour = dt.hour();
    let minute = dt.minute();

    let start = |h: u32, m: u32| -> Result<i64, HorseError> {
        dt.date()
            .and_hms_opt(h, m, 0)
            .map(|start: NaiveDateTime| start.and_utc().timestamp())
            .ok_or_else(|| HorseError::InvalidPeriod {
                reason: format!("cannot align {h:02}:{m:02}"),
            })
    };

    let lhs_ts = match (kind, anchor) {
        (PeriodKind::Week1 | PeriodKind::Day1, Anchor::Calendar) => start(0, 0)?,
        (
            PeriodKind::Week1
            | PeriodKind::Day1
            | PeriodKind::Hour12
            | PeriodKind::Hour6
            | PeriodKind::Hour3
            | PeriodKind::Hour1,
            Anchor::HourLhs,
        ) => start(hour, 0)?,
        (PeriodKind::Hour12, Anchor::Calendar) => start(hour / 12 * 12, 0)?,
        (PeriodKind::Hour6, Anchor::Calendar) => start(hour / 6 * 6, 0)?,
        (PeriodKind::Hour3, Anchor::Calendar) => start(hour / 3 * 3, 0)?,
        (PeriodKind::Hour1, Anchor::Calendar) => start(hour, 0)?,
        (PeriodKind::Hour1 | PeriodKind::Min30, Anchor::TenMinLhs) => start(hour, minute / 10 * 10)?,
        (PeriodKind::Min30, Anchor::Calendar) => start(hour, minute / 30 * 30)?,
        (PeriodKind::Min15, Anchor::Calendar) => start(hour, minute / 15 * 15)?,
        (PeriodKind::Min10, Anchor::Calendar) => start(hour, minute / 10 * 10)?,
        (PeriodKind::Min5, Anchor::Calendar) => start(hour, minute / 5 * 5)?,
        (PeriodKind::Min1, Anchor::Calendar) => start(hour, minute)?,
        (kind, anchor) => {
            return Err(HorseError::InvalidPeriod {
                reason: format!("anchor {anchor:?} is not supported by {} periods", kind.name()),
            });
        }
    };
    let rhs_ts = lhs_ts + kind.period_sec();
    assert!(
        lhs_ts as f64 <= ref_ts && ref_ts < rhs_ts as f64,
        "period boundary [{lhs_ts}, {rhs_ts}) does not enclose {ref_ts}"
    );
    Ok((lhs_ts, rhs_ts))
}

/// A window whose right-hand edge trails the shared clock by `offset` seconds.
/// Boundaries are recomputed from the clock on every access.
#[derive(Clone)]
pub struct FloatingPeriod {
    kind: PeriodKind,
    offset: f64,
    clock: Arc<Clock>,
}

impl FloatingPeriod {
    pub fn new(kind: PeriodKind, offset: f64, clock: Arc<Clock>) -> Result<Self, HorseError> {
        if offset < 0.0 {
            return Err(HorseError::temporal(
                "a floating period cannot end in the future",
            ));
        }
        Ok(Self {
            kind,
            offset,
            clock,
        })
    }

    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    pub fn period_sec(&self) -> i64 {
        self.kind.period_sec()
    }

    pub fn trailing_offset(&self) -> f64 {
        self.offset
    }

    pub fn rhs_ts(&self) -> f64 {
        self.clock.time() - self.offset
    }

    pub fn lhs_ts(&self) -> f64 {
        self.rhs_ts() - self.period_sec() as f64
    }

    pub fn contains_ts(&self, ts: f64) -> bool {
        let rhs = self.rhs_ts();
        rhs - self.period_sec() as f64 <= ts && ts < rhs
    }

    pub fn contains_fixed(&self, other: &FixedPeriod) -> bool {
        let rhs = self.rhs_ts();
        let lhs = rhs - self.period_sec() as f64;
        lhs <= other.lhs_ts() as f64 && other.rhs_ts() as f64 <= rhs
    }

    /// Both windows trail the same clock, so compare their positions relative
    /// to "now".
    pub fn contains_floating(&self, other: &FloatingPeriod) -> bool {
        let my_rhs = -self.offset;
        let my_lhs = my_rhs - self.period_sec() as f64;
        let ot_rhs = -other.offset;
        let ot_lhs = ot_rhs - other.period_sec() as f64;
        my_lhs <= ot_lhs && ot_rhs <= my_rhs
    }

    /// Shift the window `n` periods to the right. Fails if it would end after
    /// "now".
    pub fn offset(&self, n: i64) -> Result<FloatingPeriod, HorseError> {
        let offset = self.offset - (n * self.period_sec()) as f64;
        FloatingPeriod::new(self.kind, offset, self.clock.clone())
    }
}

impl PartialEq for FloatingPeriod {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.offset == other.offset
    }
}

impl fmt::Debug for FloatingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FloatingPeriod")
            .field("kind", &self.kind)
            .field("offset", &self.offset)
            .finish()
    }
}

impl fmt::Display for FloatingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rhs = self.rhs_ts();
        write!(
            f,
            "<FloatingPeriod_{} offset={}s currently {} - {}>",
            self.kind.name(),
            self.offset,
            printable_ts(rhs - self.period_sec() as f64),
            printable_ts(rhs)
        )
    }
}

/// Either flavour of period, as consumed by indicators and stores.
#[derive(Debug, Clone, PartialEq)]
pub enum Period {
    Fixed(FixedPeriod),
    Floating(FloatingPeriod),
}

impl Period {
    pub fn kind(&self) -> PeriodKind {
        match self {
            Period::Fixed(p) => p.kind(),
            Period::Floating(p) => p.kind(),
        }
    }

    pub fn period_sec(&self) -> i64 {
        self.kind().period_sec()
    }

    pub fn lhs_ts(&self) -> f64 {
        match self {
            Period::Fixed(p) => p.lhs_ts() as f64,
            Period::Floating(p) => p.lhs_ts(),
        }
    }

    pub fn rhs_ts(&self) -> f64 {
        match self {
            Period::Fixed(p) => p.rhs_ts() as f64,
            Period::Floating(p) => p.rhs_ts(),
        }
    }

    pub fn contains_ts(&self, ts: f64) -> bool {
        match self {
            Period::Fixed(p) => p.contains_ts(ts),
            Period::Floating(p) => p.contains_ts(ts),
        }
    }

    pub fn as_fixed(&self) -> Option<&FixedPeriod> {
        match self {
            Period::Fixed(p) => Some(p),
            Period::Floating(_) => None,
        }
    }

    pub fn offset(&self, n: i64) -> Result<Period, HorseError> {
        match self {
            Period::Fixed(p) => Ok(Period::Fixed(p.offset(n))),
            Period::Floating(p) => p.offset(n).map(Period::Floating),
        }
    }
}

impl From<FixedPeriod> for Period {
    fn from(p: FixedPeriod) -> Self {
        Period::Fixed(p)
    }
}

impl From<FloatingPeriod> for Period {
    fn from(p: FloatingPeriod) -> Self {
        Period::Floating(p)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Fixed(p) => p.fmt(f),
            Period::Floating(p) => p.fmt(f),
        }
    }
}

/// A recipe for a fixed period: used as a coefficient value by predictors that
/// choose which window length to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodSpec {
    pub kind: PeriodKind,
    pub anchor: Anchor,
}

impl PeriodSpec {
    pub const fn new(kind: PeriodKind, anchor: Anchor) -> Self {
        Self { kind, anchor }
    }

    pub fn at(&self, ts: f64) -> Result<FixedPeriod, HorseError> {
        FixedPeriod::new(self.kind, ts, self.anchor)
    }
}

impl fmt::Display for PeriodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Anchor::Calendar => write!(f, "{}", self.kind.name()),
            anchor => write!(f, "{}/{:?}", self.kind.name(), anchor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2015-03-01 12:34:56 UTC
    const TS: f64 = 1_425_213_296.0;
    const NOON: i64 = 1_425_211_200;
    const MIDNIGHT: i64 = 1_425_168_000;

    #[test]
    fn day_aligns_to_midnight() {
        let p = FixedPeriod::around(PeriodKind::Day1, TS).unwrap();
        assert_eq!(p.lhs_ts(), MIDNIGHT);
        assert_eq!(p.rhs_ts(), MIDNIGHT + DAY);
    }

    #[test]
    fn hour_multiples_align_within_day() {
        let p12 = FixedPeriod::around(PeriodKind::Hour12, TS).unwrap();
        assert_eq!(p12.lhs_ts(), NOON);
        let p6 = FixedPeriod::around(PeriodKind::Hour6, TS).unwrap();
        assert_eq!(p6.lhs_ts(), NOON);
        let p3 = FixedPeriod::around(PeriodKind::Hour3, TS).unwrap();
        assert_eq!(p3.lhs_ts(), NOON);
        let p1 = FixedPeriod::around(PeriodKind::Hour1, TS).unwrap();
        assert_eq!(p1.lhs_ts(), NOON);
    }

    #[test]
    fn minute_periods_align() {
        let p30 = FixedPeriod::around(PeriodKind::Min30, TS).unwrap();
        assert_eq!(p30.lhs_ts(), NOON + 30 * MINUTE);
        let p15 = FixedPeriod::around(PeriodKind::Min15, TS).unwrap();
        assert_eq!(p15.lhs_ts(), NOON + 30 * MINUTE);
        let p5 = FixedPeriod::around(PeriodKind::Min5, TS).unwrap();
        assert_eq!(p5.lhs_ts(), NOON + 30 * MINUTE);
        let p1 = FixedPeriod::around(PeriodKind::Min1, TS).unwrap();
        assert_eq!(p1.lhs_ts(), NOON + 34 * MINUTE);
    }

    #[test]
    fn anchors_move_left_boundary() {
        let p = FixedPeriod::new(PeriodKind::Hour12, TS, Anchor::HourLhs).unwrap();
        assert_eq!(p.lhs_ts(), NOON);
        let p = FixedPeriod::new(PeriodKind::Hour1, TS, Anchor::TenMinLhs).unwrap();
        assert_eq!(p.lhs_ts(), NOON + 30 * MINUTE);
        let p = FixedPeriod::new(PeriodKind::Day1, TS, Anchor::HourLhs).unwrap();
        assert_eq!(p.lhs_ts(), NOON);
    }

    #[test]
    fn unsupported_anchor_rejected() {
        let err = FixedPeriod::new(PeriodKind::Min15, TS, Anchor::HourLhs).unwrap_err();
        assert!(matches!(err, HorseError::InvalidPeriod { .. }));
    }

    #[test]
    fn containment_is_half_open() {
        let p = FixedPeriod::around(PeriodKind::Hour1, TS).unwrap();
        assert!(p.contains_ts(p.lhs_ts() as f64));
        assert!(!p.contains_ts(p.rhs_ts() as f64));
        assert!(p.contains_ts(p.rhs_ts() as f64 - 0.001));
    }

    #[test]
    fn period_contains_period() {
        let day = FixedPeriod::around(PeriodKind::Day1, TS).unwrap();
        let hour = FixedPeriod::around(PeriodKind::Hour1, TS).unwrap();
        assert!(day.contains_period(&hour));
        assert!(!hour.contains_period(&day));
        assert!(!day.contains_period(&(day + 1)));

        let last_hour = FixedPeriod::around(PeriodKind::Hour1, day.rhs_ts() as f64 - 1.0).unwrap();
        assert_eq!(last_hour.rhs_ts(), day.rhs_ts());
        assert!(day.contains_period(&last_hour));
        assert!(!day.contains_period(&(last_hour + 1)));
        assert!(!day.contains_period(&(day - 1)));
    }

    #[test]
    fn offset_preserves_anchor_and_kind() {
        let p = FixedPeriod::new(PeriodKind::Hour1, TS, Anchor::TenMinLhs).unwrap();
        let q = p - 3;
        assert_eq!(q.anchor(), Anchor::TenMinLhs);
        assert_eq!(q.lhs_ts(), p.lhs_ts() - 3 * HOUR);
        assert_eq!(q + 3, p);
    }

    #[test]
    fn equality_ignores_anchor_but_not_kind() {
        let a = FixedPeriod::new(PeriodKind::Hour1, TS, Anchor::Calendar).unwrap();
        let b = FixedPeriod::new(PeriodKind::Hour1, TS, Anchor::HourLhs).unwrap();
        let c = FixedPeriod::around(PeriodKind::Hour6, TS).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn floating_tracks_clock() {
        let clock = Arc::new(Clock::fixed(TS));
        let p = FloatingPeriod::new(PeriodKind::Min5, 60.0, clock.clone()).unwrap();
        assert_eq!(p.rhs_ts(), TS - 60.0);
        assert_eq!(p.lhs_ts(), TS - 360.0);
        clock.override_time(Some(TS + 100.0));
        assert_eq!(p.rhs_ts(), TS + 40.0);
    }

    #[test]
    fn floating_offset_cannot_reach_future() {
        let clock = Arc::new(Clock::fixed(TS));
        let p = FloatingPeriod::new(PeriodKind::Min5, 300.0, clock).unwrap();
        let q = p.offset(1).unwrap();
        assert_eq!(q.trailing_offset(), 0.0);
        assert!(matches!(p.offset(2), Err(HorseError::Temporal { .. })));
        assert_eq!(p.offset(-1).unwrap().trailing_offset(), 600.0);
    }

    #[test]
    fn floating_containment() {
        let clock = Arc::new(Clock::fixed(NOON as f64 + 1800.0));
        let hour = FloatingPeriod::new(PeriodKind::Hour1, 0.0, clock.clone()).unwrap();
        let five = FloatingPeriod::new(PeriodKind::Min5, 60.0, clock.clone()).unwrap();
        assert!(hour.contains_floating(&five));
        assert!(!five.contains_floating(&hour));
        let fixed = FixedPeriod::around(PeriodKind::Min15, NOON as f64).unwrap();
        assert!(hour.contains_fixed(&fixed));
        assert!(hour.contains_ts(NOON as f64));
    }

    #[test]
    fn display_formats() {
        let p = FixedPeriod::around(PeriodKind::Hour1, TS).unwrap();
        assert_eq!(p.to_string(), "<FixedPeriod_1Hour from 2015-03-01t12:00:00>");
        let spec = PeriodSpec::new(PeriodKind::Hour6, Anchor::HourLhs);
        assert_eq!(spec.to_string(), "6Hour/HourLhs");
    }
}
