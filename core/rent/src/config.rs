use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Timelike, Utc};
#[cfg(feature = "json-schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RentConfig {
    /// The fixed offset "today" is evaluated in when deriving the billing
    /// month and due dates. Deployments bill in local Kenyan time (UTC+3)
    /// regardless of server timezone.
    #[serde(default = "default_billing_utc_offset_hours")]
    pub billing_utc_offset_hours: i32,
    #[serde(default = "default_due_day_of_month")]
    pub due_day_of_month: u32,
    #[serde(default = "default_generation_run_time")]
    pub generation_run_time: GenerationRunTime,
}

impl Default for RentConfig {
    fn default() -> Self {
        RentConfig {
            billing_utc_offset_hours: default_billing_utc_offset_hours(),
            due_day_of_month: default_due_day_of_month(),
            generation_run_time: default_generation_run_time(),
        }
    }
}

impl RentConfig {
    pub fn billing_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.billing_utc_offset_hours * 3600)
            .expect("billing offset out of range")
    }

    /// Clamped to 1..=28 so the due date exists in every month.
    pub fn due_day(&self) -> u32 {
        self.due_day_of_month.clamp(1, 28)
    }
}

fn default_billing_utc_offset_hours() -> i32 {
    3
}

fn default_due_day_of_month() -> u32 {
    5
}

fn default_generation_run_time() -> GenerationRunTime {
    GenerationRunTime {
        hours_past_midnight: 0,
        minutes_past_hour: 5,
    }
}

/// Daily wall-clock run time ("HH:MM") of the generation job, interpreted in
/// the billing timezone.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
pub struct GenerationRunTime {
    hours_past_midnight: u32,
    minutes_past_hour: u32,
}

impl GenerationRunTime {
    pub fn next_after(&self, after: DateTime<Utc>, billing_offset: FixedOffset) -> DateTime<Utc> {
        let tomorrow = after.with_timezone(&billing_offset) + Duration::days(1);

        let run_time = tomorrow
            .date_naive()
            .and_hms_opt(self.hours_past_midnight, self.minutes_past_hour, 0)
            .expect("run time out of range");

        run_time
            .and_local_timezone(billing_offset)
            .single()
            .expect("fixed offsets have no gaps")
            .with_timezone(&Utc)
    }
}

impl<'de> Deserialize<'de> for GenerationRunTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let time = NaiveTime::parse_from_str(&s, "%H:%M")
            .map_err(|e| serde::de::Error::custom(format!("Invalid time format '{}': {}", s, e)))?;

        Ok(GenerationRunTime {
            hours_past_midnight: time.hour(),
            minutes_past_hour: time.minute(),
        })
    }
}

impl Serialize for GenerationRunTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let time_str = format!(
            "{:02}:{:02}",
            self.hours_past_midnight, self.minutes_past_hour
        );
        serializer.serialize_str(&time_str)
    }
}
