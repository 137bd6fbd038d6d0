use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
#[cfg(feature = "json-schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use core_money::{KesCents, SignedKesCents};

es_entity::entity_id! { TenantId }

/// Payment standing of a tenant (or of a single month's rent record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Pending,
    Partial,
    Overdue,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Overdue => "overdue",
        };
        write!(f, "{s}")
    }
}

/// Only `Active` tenancies participate in rent generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum TenancyStatus {
    Active,
    Pending,
    Expired,
}

impl std::fmt::Display for TenancyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TenancyStatus::Active => "active",
            TenancyStatus::Pending => "pending",
            TenancyStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Mobile-money confirmations carry the payer number in varying formats
/// (`2547XXXXXXXX`, `07XXXXXXXX`, `+254 7XX …`); the last nine digits are
/// stable across all of them and are what tenants are matched on.
pub const PHONE_SUFFIX_LEN: usize = 9;

pub fn phone_suffix(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    digits[digits.len().saturating_sub(PHONE_SUFFIX_LEN)..]
        .iter()
        .collect()
}

#[derive(Error, Debug)]
pub enum ParseBillingMonthError {
    #[error("ParseBillingMonthError - InvalidFormat: {0}")]
    InvalidFormat(String),
    #[error("ParseBillingMonthError - MonthOutOfRange: {0}")]
    MonthOutOfRange(u32),
}

/// A calendar billing period, rendered `YYYY-MM`. One rent record exists per
/// tenant per `BillingMonth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, ParseBillingMonthError> {
        if !(1..=12).contains(&month) {
            return Err(ParseBillingMonthError::MonthOutOfRange(month));
        }
        Ok(Self { year, month })
    }

    /// The billing month a timestamp falls in, evaluated in the billing
    /// timezone. Keeps month boundaries stable across UTC midnight.
    pub fn containing(ts: DateTime<Utc>, billing_offset: FixedOffset) -> Self {
        let local = ts.with_timezone(&billing_offset);
        Self {
            year: local.year(),
            month: local.month(),
        }
    }

    pub fn of_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("first of month is always valid")
    }

    pub fn day(self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }
}

impl std::fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for BillingMonth {
    type Err = ParseBillingMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| ParseBillingMonthError::InvalidFormat(s.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| ParseBillingMonthError::InvalidFormat(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| ParseBillingMonthError::InvalidFormat(s.to_string()))?;
        Self::new(year, month)
    }
}

impl Serialize for BillingMonth {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BillingMonth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_year_month() {
        let month: BillingMonth = "2025-03".parse().unwrap();
        assert_eq!(month, BillingMonth::new(2025, 3).unwrap());
        assert_eq!(month.to_string(), "2025-03");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("2025".parse::<BillingMonth>().is_err());
        assert!("2025-13".parse::<BillingMonth>().is_err());
        assert!("2025-00".parse::<BillingMonth>().is_err());
        assert!("march".parse::<BillingMonth>().is_err());
    }

    #[test]
    fn next_and_previous_wrap_year_boundaries() {
        let december = BillingMonth::new(2024, 12).unwrap();
        assert_eq!(december.next(), BillingMonth::new(2025, 1).unwrap());
        assert_eq!(
            BillingMonth::new(2025, 1).unwrap().previous(),
            december
        );
    }

    #[test]
    fn containing_respects_billing_offset() {
        // 2025-03-31 22:30 UTC is already April in UTC+3.
        let ts = DateTime::parse_from_rfc3339("2025-03-31T22:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let nairobi = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(
            BillingMonth::containing(ts, nairobi),
            BillingMonth::new(2025, 4).unwrap()
        );
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            BillingMonth::containing(ts, utc),
            BillingMonth::new(2025, 3).unwrap()
        );
    }

    #[test]
    fn phone_suffix_keeps_last_nine_digits() {
        assert_eq!(phone_suffix("+254 712 345 678"), "712345678");
        assert_eq!(phone_suffix("0712345678"), "712345678");
        assert_eq!(phone_suffix("254712345678"), "712345678");
        assert_eq!(phone_suffix("12345"), "12345");
    }

    #[test]
    fn serde_round_trips_as_string() {
        let month = BillingMonth::new(2025, 7).unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"2025-07\"");
        let back: BillingMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month);
    }
}
