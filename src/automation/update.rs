//! Route-layer input for `update_config`.
//!
//! Dashboard payloads arrive in a few historical shapes (camelCase keys,
//! `alternative` for every-other-day, a bare `time` instead of
//! `scheduleTime`). They are resolved here once into an [`AutomationConfig`];
//! nothing downstream looks at the raw shape again.

use super::types::{
    AutomationConfig, BusinessMetadata, Frequency, PostingConfig, ReplyConfig, SchedulePolicy,
};
use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;

const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingUpdate {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, alias = "time", alias = "schedule_time")]
    pub schedule_time: Option<String>,
    #[serde(default, alias = "postFrequency")]
    pub frequency: Option<String>,
    #[serde(default, alias = "custom_times", alias = "customSlots")]
    pub custom_times: Vec<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, alias = "businessMetadata")]
    pub business: BusinessMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyUpdate {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(alias = "principal_id", alias = "userId")]
    pub principal_id: String,
    #[serde(default, alias = "account_id")]
    pub account_id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, alias = "autoPosting")]
    pub posting: PostingUpdate,
    #[serde(default, alias = "autoReply")]
    pub reply: ReplyUpdate,
}

fn default_enabled() -> bool {
    true
}

/// Parses `HH:MM` (seconds tolerated).
pub fn parse_slot(raw: &str) -> Result<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .with_context(|| format!("invalid schedule time '{raw}' (expected HH:MM)"))
}

fn parse_timezone(raw: Option<&str>) -> Result<Tz> {
    let name = raw
        .map(str::trim)
        .filter(|tz| !tz.is_empty())
        .unwrap_or(DEFAULT_TIMEZONE);
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("invalid timezone '{name}': {e}"))
}

/// Bare hosts get `https://`; anything that is not http(s) is rejected.
fn normalize_website(raw: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = raw.map(str::trim).filter(|w| !w.is_empty()) else {
        return Ok(None);
    };
    let parsed = match url::Url::parse(raw) {
        Err(url::ParseError::RelativeUrlWithoutBase) => url::Url::parse(&format!("https://{raw}")),
        other => other,
    }
    .with_context(|| format!("invalid website url '{raw}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        bail!("website url '{raw}' must be an http(s) address");
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        bail!("website url '{raw}' must not carry credentials");
    }
    Ok(Some(parsed.to_string()))
}

fn parse_frequency(
    raw: &str,
    custom_times: &[String],
    test_interval_secs: u64,
) -> Result<Frequency> {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    let frequency = match normalized.as_str() {
        "daily" => Frequency::Daily,
        "alternative" | "every_2_days" | "every_other_day" => Frequency::EveryTwoDays,
        "weekly" => Frequency::Weekly,
        "custom" => {
            let mut slots = custom_times
                .iter()
                .map(|slot| parse_slot(slot))
                .collect::<Result<Vec<_>>>()?;
            slots.sort_unstable();
            slots.dedup();
            Frequency::Custom { slots }
        }
        "test" | "test_interval" | "test30s" => Frequency::TestInterval {
            secs: test_interval_secs.max(1),
        },
        other => bail!("unknown posting frequency '{other}'"),
    };
    Ok(frequency)
}

impl PostingUpdate {
    /// Returns `None` when no schedule was supplied; posting then skips with
    /// `ConfigurationMissing` instead of guessing a time.
    pub fn resolve_schedule(&self, test_interval_secs: u64) -> Result<Option<SchedulePolicy>> {
        let Some(raw_frequency) = self.frequency.as_deref().filter(|f| !f.trim().is_empty())
        else {
            return Ok(None);
        };

        let mut frequency = parse_frequency(raw_frequency, &self.custom_times, test_interval_secs)?;
        let timezone = parse_timezone(self.timezone.as_deref())?;
        let time = self.schedule_time.as_deref().map(parse_slot).transpose()?;

        if let Frequency::Custom { slots } = &mut frequency
            && slots.is_empty()
        {
            match time {
                Some(single) => slots.push(single),
                None => bail!("custom frequency needs at least one time slot"),
            }
        }

        let time = match (&frequency, time) {
            (_, Some(time)) => time,
            (Frequency::Custom { slots }, None) => slots[0],
            (Frequency::TestInterval { .. }, None) => NaiveTime::MIN,
            (_, None) => return Ok(None),
        };

        Ok(Some(SchedulePolicy {
            frequency,
            time,
            timezone,
        }))
    }
}

impl ConfigUpdate {
    /// Produces the stored shape. `last_run_at`/`last_check_at` carry over
    /// from `previous` so reconfiguring never causes a catch-up double post.
    pub fn resolve(
        self,
        location_id: &str,
        previous: Option<&AutomationConfig>,
        test_interval_secs: u64,
    ) -> Result<AutomationConfig> {
        if location_id.trim().is_empty() {
            bail!("location id must not be empty");
        }
        if self.principal_id.trim().is_empty() {
            bail!("principal id must not be empty");
        }

        let schedule = self.posting.resolve_schedule(test_interval_secs)?;
        let mut business = self.posting.business;
        business.website_url = normalize_website(business.website_url.as_deref())?;

        Ok(AutomationConfig {
            location_id: location_id.to_string(),
            principal_id: self.principal_id,
            account_id: self.account_id.filter(|id| !id.trim().is_empty()),
            enabled: self.enabled,
            posting: PostingConfig {
                enabled: self.posting.enabled,
                schedule,
                last_run_at: previous.and_then(|p| p.posting.last_run_at),
                business,
            },
            reply: ReplyConfig {
                enabled: self.reply.enabled,
                last_check_at: previous.and_then(|p| p.reply.last_check_at),
            },
            disabled: None,
        })
    }
}
