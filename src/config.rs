use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use crate::model::Minutes;

/// Opening and closing wall-clock times for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl BusinessHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// Hours given as whole `open`..`close` o'clock.
    pub fn from_hours(open: u32, close: u32) -> Option<Self> {
        Some(Self {
            open: NaiveTime::from_hms_opt(open, 0, 0)?,
            close: NaiveTime::from_hms_opt(close, 0, 0)?,
        })
    }
}

/// Scheduling policy handed to the availability engine and the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Indexed by `Weekday::num_days_from_monday()`. `None` means closed.
    pub weekly: [Option<BusinessHours>; 7],
    /// Step between candidate start times.
    pub slot_minutes: Minutes,
    /// How many days ahead, today included, a customer may book.
    pub horizon_days: u32,
}

fn oclock(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for SchedulePolicy {
    /// 10:00 to 20:00 every day.
    fn default() -> Self {
        Self::uniform(BusinessHours::new(oclock(10), oclock(20)))
    }
}

impl SchedulePolicy {
    /// Same hours every day, 30-minute slots, two-week horizon.
    pub fn uniform(hours: BusinessHours) -> Self {
        Self {
            weekly: [Some(hours); 7],
            slot_minutes: 30,
            horizon_days: 14,
        }
    }

    pub fn with_closed(mut self, day: Weekday) -> Self {
        self.weekly[day.num_days_from_monday() as usize] = None;
        self
    }

    pub fn hours_for(&self, day: NaiveDate) -> Option<BusinessHours> {
        self.weekly[day.weekday().num_days_from_monday() as usize]
    }

    /// Whether `day` can be booked when the current date is `today`.
    pub fn within_horizon(&self, day: NaiveDate, today: NaiveDate) -> bool {
        let offset = (day - today).num_days();
        offset >= 0 && offset < i64::from(self.horizon_days)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    ZeroSlotMinutes,
    EmptyHours { open: NaiveTime, close: NaiveTime },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            ConfigError::ZeroSlotMinutes => write!(f, "slot length must be at least one minute"),
            ConfigError::EmptyHours { open, close } => {
                write!(f, "opening time {open} is not before closing time {close}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Process configuration, read from `TURNERO_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub seed: bool,
    pub schedule: SchedulePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("TURNERO_DATA_DIR").unwrap_or_else(|| "./data".into());
        let metrics_port: Option<u16> = lookup("TURNERO_METRICS_PORT").and_then(|s| s.parse().ok());
        let compact_threshold: u64 = lookup("TURNERO_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let seed = lookup("TURNERO_SEED").is_some_and(|s| matches!(s.as_str(), "1" | "true" | "yes"));

        let open = parse_time(&lookup, "TURNERO_OPEN", "10:00")?;
        let close = parse_time(&lookup, "TURNERO_CLOSE", "20:00")?;
        if open >= close {
            return Err(ConfigError::EmptyHours { open, close });
        }

        let mut schedule = SchedulePolicy::uniform(BusinessHours::new(open, close));
        if let Some(raw) = lookup("TURNERO_SLOT_MINUTES") {
            let slot: Minutes = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "TURNERO_SLOT_MINUTES",
                value: raw.clone(),
            })?;
            if slot == 0 {
                return Err(ConfigError::ZeroSlotMinutes);
            }
            schedule.slot_minutes = slot;
        }
        if let Some(raw) = lookup("TURNERO_HORIZON_DAYS") {
            schedule.horizon_days = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "TURNERO_HORIZON_DAYS",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup("TURNERO_CLOSED_DAYS") {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let day: Weekday = part.parse().map_err(|_| ConfigError::Invalid {
                    key: "TURNERO_CLOSED_DAYS",
                    value: part.to_string(),
                })?;
                schedule = schedule.with_closed(day);
            }
        }

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            metrics_port,
            compact_threshold,
            seed,
            schedule,
        })
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("turnero.journal")
    }
}

fn parse_time(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<NaiveTime, ConfigError> {
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| ConfigError::Invalid { key, value: raw })
}
