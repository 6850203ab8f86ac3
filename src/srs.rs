//! SM-2 scheduling.
//!
//! Maps a card's prior scheduling state and a new quality rating to the state
//! it should be stored with. Pure: the clock is passed in, nothing is read or
//! written.

use crate::error::ScheduleError;
use crate::models::ProgressStatus;
use chrono::{DateTime, Days, Duration, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EASINESS: f64 = 2.5;
pub const MIN_EASINESS: f64 = 1.3;
/// Longest interval a card can be given: one hundred years.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// A validated quality rating.
///
/// Grade:
/// 5 - Perfect response
/// 4 - Correct response after a hesitation
/// 3 - Correct response recalled with serious difficulty
/// 2 - Incorrect response; where the correct one seemed easy to recall
/// 1 - Incorrect response; the correct one remembered
/// 0 - Complete blackout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const BLACKOUT: Quality = Quality(0);
    pub const WRONG: Quality = Quality(1);
    pub const BARELY: Quality = Quality(2);
    pub const HARD: Quality = Quality(3);
    pub const GOOD: Quality = Quality(4);
    pub const PERFECT: Quality = Quality(5);

    pub const MAX: u8 = 5;
    pub const PASSING: u8 = 3;

    pub fn new(value: i64) -> Result<Self, ScheduleError> {
        match u8::try_from(value) {
            Ok(v) if v <= Self::MAX => Ok(Self(v)),
            _ => Err(ScheduleError::InvalidQuality(value as f64)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Grades of 3 and above count toward the repetition streak.
    pub fn is_passing(self) -> bool {
        self.0 >= Self::PASSING
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "Blackout",
            1 => "Wrong",
            2 => "Barely recalled",
            3 => "Hard",
            4 => "Good",
            _ => "Perfect",
        }
    }
}

impl TryFrom<i64> for Quality {
    type Error = ScheduleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Quality::new(value)
    }
}

impl TryFrom<f64> for Quality {
    type Error = ScheduleError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(ScheduleError::InvalidQuality(value));
        }
        Quality::new(value as i64).map_err(|_| ScheduleError::InvalidQuality(value))
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// The three numbers SM-2 carries from one review to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub repetitions: u32,
    pub easiness_factor: f64,
    pub interval_days: u32,
}

impl Default for ScheduleState {
    /// State assumed for a card that has never been reviewed.
    fn default() -> Self {
        Self {
            repetitions: 0,
            easiness_factor: DEFAULT_EASINESS,
            interval_days: 0,
        }
    }
}

impl ScheduleState {
    pub fn status(&self) -> ProgressStatus {
        ProgressStatus::from_repetitions(self.repetitions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub repetitions: u32,
    pub easiness_factor: f64,
    pub interval_days: u32,
    pub next_review_date: DateTime<Utc>,
    pub status: ProgressStatus,
}

impl ScheduleUpdate {
    pub fn state(&self) -> ScheduleState {
        ScheduleState {
            repetitions: self.repetitions,
            easiness_factor: self.easiness_factor,
            interval_days: self.interval_days,
        }
    }
}

/// Computes the next schedule for a card reviewed at `now`.
///
/// A lapse (quality < 3) resets the streak and brings the card back the next
/// day. A passing review moves the interval 1 → 6 → interval × EF, using the
/// prior EF. The EF is then adjusted from the quality alone, floored at 1.3
/// and rounded to two decimals.
pub fn schedule<Tz: TimeZone>(
    prior: &ScheduleState,
    quality: Quality,
    now: &DateTime<Tz>,
) -> Result<ScheduleUpdate, ScheduleError> {
    let (repetitions, interval_days) = if quality.is_passing() {
        let interval = match prior.repetitions {
            0 => 1,
            1 => 6,
            _ => grow_interval(prior.interval_days, prior.easiness_factor),
        };
        (prior.repetitions.saturating_add(1), interval)
    } else {
        (0, 1)
    };

    let easiness_factor = next_easiness(prior.easiness_factor, quality);
    let next_review_date = add_calendar_days(now, interval_days)?;

    Ok(ScheduleUpdate {
        repetitions,
        easiness_factor,
        interval_days,
        next_review_date,
        status: ProgressStatus::from_repetitions(repetitions),
    })
}

/// Validates a raw quality and schedules against the local wall clock.
pub fn update(prior: &ScheduleState, quality: i64) -> Result<ScheduleUpdate, ScheduleError> {
    let quality = Quality::new(quality)?;
    schedule(prior, quality, &Local::now())
}

fn grow_interval(interval_days: u32, easiness_factor: f64) -> u32 {
    // `as` saturates; a mature card cannot fall back to a zero interval.
    ((f64::from(interval_days) * easiness_factor).round() as u32).clamp(1, MAX_INTERVAL_DAYS)
}

// EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
fn next_easiness(easiness_factor: f64, quality: Quality) -> f64 {
    let miss = f64::from(Quality::MAX - quality.value());
    let adjusted = easiness_factor + (0.1 - miss * (0.08 + miss * 0.02));
    round_hundredths(adjusted.max(MIN_EASINESS))
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Adds whole calendar days in the caller's time zone. When the target local
/// time falls in a DST gap or overlap, the days are added as 24h blocks.
fn add_calendar_days<Tz: TimeZone>(
    now: &DateTime<Tz>,
    days: u32,
) -> Result<DateTime<Utc>, ScheduleError> {
    now.clone()
        .checked_add_days(Days::new(u64::from(days)))
        .or_else(|| now.clone().checked_add_signed(Duration::days(i64::from(days))))
        .map(|date| date.with_timezone(&Utc))
        .ok_or(ScheduleError::DateOutOfRange(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn state(repetitions: u32, easiness_factor: f64, interval_days: u32) -> ScheduleState {
        ScheduleState {
            repetitions,
            easiness_factor,
            interval_days,
        }
    }

    fn q(value: i64) -> Quality {
        Quality::new(value).unwrap()
    }

    #[test]
    fn test_first_passing_review() {
        for grade in 3..=5 {
            let next = schedule(&ScheduleState::default(), q(grade), &now()).unwrap();
            assert_eq!(next.interval_days, 1);
            assert_eq!(next.repetitions, 1);
            assert_eq!(next.status, ProgressStatus::Learning);
        }
    }

    #[test]
    fn test_second_passing_review() {
        for grade in 3..=5 {
            let next = schedule(&state(1, 2.5, 1), q(grade), &now()).unwrap();
            assert_eq!(next.interval_days, 6);
            assert_eq!(next.repetitions, 2);
            assert_eq!(next.status, ProgressStatus::Learning);
        }
    }

    #[test]
    fn test_mature_review_multiplies_by_prior_ef() {
        let next = schedule(&state(2, 2.5, 6), q(4), &now()).unwrap();
        assert_eq!(next.interval_days, 15);
        assert_eq!(next.repetitions, 3);
        assert_eq!(next.status, ProgressStatus::Review);

        // Prior EF is used even though quality 3 lowers it.
        let next = schedule(&state(4, 2.0, 10), q(3), &now()).unwrap();
        assert_eq!(next.interval_days, 20);
        assert_eq!(next.easiness_factor, 1.86);
    }

    #[test]
    fn test_lapse_resets_streak() {
        for grade in 0..=2 {
            let next = schedule(&state(5, 2.5, 30), q(grade), &now()).unwrap();
            assert_eq!(next.repetitions, 0);
            assert_eq!(next.interval_days, 1);
            assert_eq!(next.status, ProgressStatus::New);
            assert!(next.easiness_factor < 2.5);
        }
    }

    #[test]
    fn test_ef_adjustment_per_quality() {
        let expected = [1.7, 1.96, 2.18, 2.36, 2.5, 2.6];
        for (grade, ef) in expected.iter().enumerate() {
            let next = schedule(&ScheduleState::default(), q(grade as i64), &now()).unwrap();
            assert_eq!(next.easiness_factor, *ef, "quality {grade}");
        }
    }

    #[test]
    fn test_ef_floor() {
        let mut current = ScheduleState::default();
        for _ in 0..20 {
            current = schedule(&current, q(0), &now()).unwrap().state();
            assert!(current.easiness_factor >= MIN_EASINESS);
        }
        assert_eq!(current.easiness_factor, MIN_EASINESS);
    }

    #[test]
    fn test_quality_four_keeps_ef_without_drift() {
        let mut current = ScheduleState::default();
        for _ in 0..10 {
            current = schedule(&current, q(4), &now()).unwrap().state();
        }
        assert_eq!(current.easiness_factor, 2.5);
    }

    #[test]
    fn test_walkthrough() {
        let first = schedule(&ScheduleState::default(), q(4), &now()).unwrap();
        assert_eq!((first.repetitions, first.interval_days), (1, 1));
        assert_eq!(first.easiness_factor, 2.5);
        assert_eq!(first.status, ProgressStatus::Learning);

        let second = schedule(&first.state(), q(5), &now()).unwrap();
        assert_eq!((second.repetitions, second.interval_days), (2, 6));
        assert_eq!(second.easiness_factor, 2.6);
        assert_eq!(second.status, ProgressStatus::Learning);

        let third = schedule(&second.state(), q(5), &now()).unwrap();
        assert_eq!((third.repetitions, third.interval_days), (3, 16));
        assert_eq!(third.easiness_factor, 2.7);
        assert_eq!(third.status, ProgressStatus::Review);

        let lapse = schedule(&third.state(), q(1), &now()).unwrap();
        assert_eq!((lapse.repetitions, lapse.interval_days), (0, 1));
        assert_eq!(lapse.easiness_factor, 2.16);
    }

    #[test]
    fn test_next_review_is_calendar_days_ahead() {
        let next = schedule(&state(1, 2.5, 1), q(4), &now()).unwrap();
        assert_eq!(
            next.next_review_date,
            Utc.with_ymd_and_hms(2024, 3, 16, 12, 0, 0).unwrap()
        );

        let eve = Utc.with_ymd_and_hms(2023, 12, 31, 23, 30, 0).unwrap();
        let next = schedule(&ScheduleState::default(), q(5), &eve).unwrap();
        assert_eq!(
            next.next_review_date,
            Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_next_review_keeps_local_wall_time() {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 2, 28, 8, 0, 0).unwrap();
        let next = schedule(&ScheduleState::default(), q(3), &local).unwrap();
        assert_eq!(
            next.next_review_date.with_timezone(&offset),
            offset.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_review_strictly_future() {
        let before = Utc::now();
        let next = update(&ScheduleState::default(), 0).unwrap();
        assert!(next.next_review_date > before);
    }

    #[test]
    fn test_invalid_quality_rejected() {
        let prior = state(3, 2.2, 12);
        let snapshot = prior;
        for bad in [-1, 6, 100, i64::MIN] {
            let err = update(&prior, bad).unwrap_err();
            assert!(matches!(err, ScheduleError::InvalidQuality(_)));
        }
        assert_eq!(prior, snapshot);
    }

    #[test]
    fn test_quality_from_float() {
        assert_eq!(Quality::try_from(4.0).unwrap().value(), 4);
        assert!(Quality::try_from(3.5).is_err());
        assert!(Quality::try_from(f64::NAN).is_err());
        assert!(Quality::try_from(-0.5).is_err());
        assert!(Quality::try_from(5.0000001).is_err());
    }

    #[test]
    fn test_quality_serde_validates() {
        let ok: Quality = serde_json::from_str("3").unwrap();
        assert_eq!(ok.value(), 3);
        assert!(serde_json::from_str::<Quality>("7").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "3");
    }

    #[test]
    fn test_interval_capped_at_hundred_years() {
        let next = schedule(&state(20, 4.0, 80_000_000), q(5), &now()).unwrap();
        assert_eq!(next.interval_days, MAX_INTERVAL_DAYS);
        assert_eq!(next.repetitions, 21);

        // A long streak of perfect answers keeps scheduling forever.
        let mut current = ScheduleState::default();
        for _ in 0..40 {
            current = schedule(&current, q(5), &now()).unwrap().state();
        }
        assert_eq!(current.interval_days, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_labels() {
        assert_eq!(q(0).label(), "Blackout");
        assert_eq!(q(5).label(), "Perfect");
        assert_eq!(Quality::BARELY.label(), "Barely recalled");
    }
}
