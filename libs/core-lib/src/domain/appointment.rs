use super::professional::{BlockingPeriod, WorkingWindow};
use super::timestamp::{self, Timestamp};
use crate::CoreError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const APPOINTMENTS: &str = "agendamentos";

const MAX_DURATION_MINUTES: u32 = 24 * 60;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Canceled,
}

/// Half-open interval `[start, end)` in tenant wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, duration: TimeDelta) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl From<&BlockingPeriod> for Interval {
    fn from(block: &BlockingPeriod) -> Self {
        Self {
            start: block.start,
            end: block.end,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub negocio_id: String,
    pub profissional_id: String,
    pub cliente_id: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(with = "timestamp::wall_clock")]
    pub start: NaiveDateTime,
    /// Calendar day of `start`, kept for equality queries.
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub canceled_at: Option<Timestamp>,
    #[serde(default)]
    pub canceled_by: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub confirmed_at: Option<Timestamp>,
    pub created_by: String,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
    #[serde(with = "timestamp")]
    pub updated_at: Timestamp,
}

pub struct NewAppointment {
    pub negocio_id: String,
    pub profissional_id: String,
    pub cliente_id: String,
    pub service: Option<String>,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub notes: Option<String>,
    pub created_by: String,
}

impl Appointment {
    pub fn schedule(new: NewAppointment) -> Result<Self, CoreError> {
        validate_duration(new.duration_minutes)?;
        let now = timestamp::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            negocio_id: new.negocio_id,
            profissional_id: new.profissional_id,
            cliente_id: new.cliente_id,
            service: new.service,
            start: new.start,
            date: new.start.date(),
            duration_minutes: new.duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes: new.notes,
            cancellation_reason: None,
            canceled_at: None,
            canceled_by: None,
            confirmed_at: None,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start, minutes(self.duration_minutes))
    }

    pub fn is_active(&self) -> bool {
        self.status != AppointmentStatus::Canceled
    }

    /// Canceling again is allowed and re-stamps the cancellation.
    pub fn cancel(&mut self, reason: Option<String>, by: &str) {
        let now = timestamp::now();
        self.status = AppointmentStatus::Canceled;
        self.cancellation_reason = reason;
        self.canceled_at = Some(now);
        self.canceled_by = Some(by.to_string());
        self.updated_at = now;
    }

    pub fn confirm(&mut self) -> Result<(), CoreError> {
        if self.status == AppointmentStatus::Canceled {
            return Err(CoreError::InvalidOperation(
                "a canceled appointment cannot be confirmed".into(),
            ));
        }
        let now = timestamp::now();
        self.status = AppointmentStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

pub fn validate_duration(duration_minutes: u32) -> Result<(), CoreError> {
    if duration_minutes == 0 || duration_minutes > MAX_DURATION_MINUTES {
        return Err(CoreError::Validation(format!(
            "duration must be between 1 and {} minutes",
            MAX_DURATION_MINUTES
        )));
    }
    Ok(())
}

pub fn minutes(m: u32) -> TimeDelta {
    TimeDelta::minutes(i64::from(m))
}

/// First non-canceled appointment overlapping `candidate`, if any.
pub fn find_conflict<'a>(
    existing: &'a [Appointment],
    candidate: &Interval,
) -> Option<&'a Appointment> {
    existing
        .iter()
        .filter(|a| a.is_active())
        .find(|a| a.interval().overlaps(candidate))
}

/// Stored `date` values whose appointments can overlap `interval`.
/// Appointments last at most a day, so one booked the day before may
/// still be running when `interval` starts.
pub fn overlapping_dates(interval: &Interval) -> Vec<NaiveDate> {
    let first = interval.start.date() - TimeDelta::days(1);
    let last = (interval.end - TimeDelta::nanoseconds(1))
        .date()
        .max(interval.start.date());
    first.iter_days().take_while(|d| *d <= last).collect()
}

/// The whole of `date` as an interval.
pub fn day_interval(date: NaiveDate) -> Interval {
    Interval::new(date.and_time(NaiveTime::MIN), TimeDelta::days(1))
}

/// Free start times on `date` for a service of `duration`.
///
/// Candidates step through each working window of the date's weekday at
/// `duration` stride while the whole service still fits in the window. A
/// candidate is dropped when it overlaps a non-canceled appointment or a
/// blocking period. Result is ascending without duplicates.
pub fn available_slots(
    windows: &[WorkingWindow],
    date: NaiveDate,
    duration: TimeDelta,
    appointments: &[Appointment],
    blocks: &[BlockingPeriod],
) -> Vec<NaiveTime> {
    if duration <= TimeDelta::zero() {
        return Vec::new();
    }
    let busy: Vec<Interval> = appointments
        .iter()
        .filter(|a| a.is_active())
        .map(Appointment::interval)
        .chain(blocks.iter().map(Interval::from))
        .collect();

    let mut slots = Vec::new();
    for window in windows.iter().filter(|w| w.weekday == date.weekday()) {
        let window_end = date.and_time(window.end);
        let mut candidate = date.and_time(window.start);
        while candidate + duration <= window_end {
            let slot = Interval::new(candidate, duration);
            if !busy.iter().any(|b| b.overlaps(&slot)) {
                slots.push(candidate.time());
            }
            candidate += duration;
        }
    }
    slots.sort();
    slots.dedup();
    slots
}

/// How bookings treat overlaps with existing appointments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingPolicy {
    /// Persist without re-checking availability.
    #[default]
    Permissive,
    /// Re-check inside the booking transaction and refuse overlaps.
    RejectOverlaps,
}

impl FromStr for BookingPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(BookingPolicy::Permissive),
            "reject_overlaps" => Ok(BookingPolicy::RejectOverlaps),
            other => Err(CoreError::Configuration(format!(
                "unknown booking policy '{}'",
                other
            ))),
        }
    }
}
