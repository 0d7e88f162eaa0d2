//! Value objects for the guarantee domain.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Merchant-scoped reservation identifier.
///
/// This is the dedup key for session creation: re-submitting the same
/// reservation ID for the same merchant returns the existing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    /// Creates a new reservation ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reservation ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReservationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReservationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ReservationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Money amount represented in minor currency units to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (e.g., 3000 = 30.00 EUR)
    minor: i64,
}

impl Money {
    /// Creates a new Money amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    /// Creates a new Money amount from major units (e.g., whole euros).
    pub fn from_major(major: i64) -> Self {
        Self { minor: major * 100 }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { minor: 0 }
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the major-unit portion (whole number).
    pub fn major(&self) -> i64 {
        self.minor / 100
    }

    /// Returns the minor-unit remainder after major units.
    pub fn minor_part(&self) -> i64 {
        self.minor.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Multiplies by a head count.
    pub fn multiply(&self, count: u32) -> Money {
        Money {
            minor: self.minor * count as i64,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.minor < 0 {
            write!(f, "-{}.{:02}", self.major().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor + rhs.minor,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor - rhs.minor,
        }
    }
}

/// Customer contact details snapshotted onto a session at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    /// Customer display name.
    pub name: String,

    /// Email address, if provided.
    pub email: Option<String>,

    /// Phone number, if provided.
    pub phone: Option<String>,
}

impl CustomerDetails {
    /// Creates customer details.
    pub fn new(
        name: impl Into<String>,
        email: Option<String>,
        phone: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email,
            phone,
        }
    }
}

/// The reserved time window, snapshotted onto a session at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSlot {
    /// Calendar date of the reservation.
    pub date: NaiveDate,

    /// Local start time.
    pub time: NaiveTime,

    /// Duration in minutes.
    pub duration_minutes: u32,

    /// IANA timezone name the date/time are expressed in.
    pub timezone: String,
}

impl ReservationSlot {
    /// Creates a reservation slot.
    pub fn new(
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            date,
            time,
            duration_minutes,
            timezone: timezone.into(),
        }
    }

    /// Returns the local start of the reservation window.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Returns the local end of the reservation window (start + duration).
    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + TimeDelta::minutes(self.duration_minutes as i64)
    }
}
