use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// How long a throttled key stays closed after an admitted submission.
///
/// Parsed from `"daily"` or `<n><unit>` (`s`, `m`, `h`, `d`, `w`; a bare
/// number is seconds). Anything else is kept as [`Throttle::Unsupported`] so
/// that the misconfiguration surfaces on the enqueue attempt that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Throttle {
    /// Closed until the end of the local day containing the schedule time.
    Daily,
    /// Closed for a fixed window past the schedule time.
    Every(TimeDelta),
    Unsupported(String),
}

impl Throttle {
    /// Cache TTL for a submission scheduled at `scheduled_at`, seen at `now`.
    ///
    /// Daily: from now to 23:59:59.999 of the day containing `scheduled_at`
    /// in `offset`. Every: the window plus the delay until `scheduled_at`, so
    /// the entry outlives the scheduled execution. An absent schedule means
    /// now; results never go below zero. A window whose expiry instant can't
    /// be represented is an error.
    pub fn expiry(
        &self,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<TimeDelta, String> {
        let at = scheduled_at.unwrap_or(now);
        let ttl = match self {
            Throttle::Daily => end_of_day(at, offset)? - now,
            Throttle::Every(window) if *window > TimeDelta::zero() => {
                // Caches store an absolute expiry, so `now + ttl` must exist.
                window
                    .checked_add(&(at - now).max(TimeDelta::zero()))
                    .filter(|ttl| now.checked_add_signed(*ttl).is_some())
                    .ok_or_else(|| format!("throttle window {self} is out of range"))?
            }
            Throttle::Every(window) => {
                return Err(format!("throttle window must be positive, got {window}"));
            }
            Throttle::Unsupported(raw) => {
                return Err(format!("unsupported throttle setting {raw:?}"));
            }
        };
        Ok(ttl.max(TimeDelta::zero()))
    }
}

/// Last millisecond of the day containing `at`, as seen from `offset`.
fn end_of_day(at: DateTime<Utc>, offset: FixedOffset) -> Result<DateTime<Utc>, String> {
    let last_ms = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| "invalid end-of-day time".to_string())?;
    at.with_timezone(&offset)
        .date_naive()
        .and_time(last_ms)
        .and_local_timezone(offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("no end of day for {at} at offset {offset}"))
}

impl From<String> for Throttle {
    fn from(raw: String) -> Self {
        raw.parse().unwrap_or(Throttle::Unsupported(raw))
    }
}

impl From<Throttle> for String {
    fn from(throttle: Throttle) -> Self {
        throttle.to_string()
    }
}

impl From<TimeDelta> for Throttle {
    fn from(window: TimeDelta) -> Self {
        Throttle::Every(window)
    }
}

impl std::str::FromStr for Throttle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("daily") {
            return Ok(Throttle::Daily);
        }
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let n: i64 = digits
            .parse()
            .map_err(|_| format!("invalid throttle setting: {s}"))?;
        let window = match unit.trim() {
            "" | "s" => TimeDelta::try_seconds(n),
            "m" => TimeDelta::try_minutes(n),
            "h" => TimeDelta::try_hours(n),
            "d" => TimeDelta::try_days(n),
            "w" => TimeDelta::try_weeks(n),
            _ => None,
        };
        window
            .map(Throttle::Every)
            .ok_or_else(|| format!("invalid throttle setting: {s}"))
    }
}

impl std::fmt::Display for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Throttle::Daily => f.write_str("daily"),
            Throttle::Every(window) => {
                let secs = window.num_seconds();
                let (n, unit) = [(604_800, "w"), (86_400, "d"), (3_600, "h"), (60, "m")]
                    .into_iter()
                    .find(|(size, _)| secs != 0 && secs % size == 0)
                    .map(|(size, unit)| (secs / size, unit))
                    .unwrap_or((secs, "s"));
                write!(f, "{n}{unit}")
            }
            Throttle::Unsupported(raw) => f.write_str(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Effective tracking policy of a job type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// A newer request for a tracked key supersedes the pending one.
    pub debounced: bool,
    /// Requests inside the throttle window are coalesced.
    pub throttled: Option<Throttle>,
}

impl Policy {
    /// Whether an existing tracker for the key is reused instead of
    /// creating a fresh one.
    pub fn reuses_key(&self) -> bool {
        self.debounced || self.throttled.is_some()
    }

    /// Merge registered options. Last write wins per option.
    pub fn merge(&mut self, options: PolicyOptions) {
        if let Some(debounced) = options.debounced {
            self.debounced = debounced;
        }
        if let Some(throttled) = options.throttled {
            self.throttled = Some(throttled);
        }
    }
}

/// Options accepted by a policy registration call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOptions {
    #[serde(default)]
    pub debounced: Option<bool>,
    #[serde(default)]
    pub throttled: Option<Throttle>,
}

impl PolicyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debounced(mut self, debounced: bool) -> Self {
        self.debounced = Some(debounced);
        self
    }

    pub fn throttled(mut self, throttle: impl Into<Throttle>) -> Self {
        self.throttled = Some(throttle.into());
        self
    }
}
