use crate::automation::{Frequency, SchedulePolicy};
use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// When the next post for `policy` is due.
///
/// With a previous run the result is always strictly after `last_run_at`, but
/// may lie in the past when a slot was missed; callers treat that as "due
/// now". Without a previous run the result is the next slot strictly after
/// `now`.
pub fn compute_next_due(
    policy: &SchedulePolicy,
    last_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let tz = policy.timezone;

    if let Frequency::TestInterval { secs } = policy.frequency {
        let period = Duration::seconds(i64::try_from(secs.max(1)).unwrap_or(86_400));
        return last_run_at.unwrap_or(now) + period;
    }

    let Some(last_run) = last_run_at else {
        return next_slot_after(policy, now);
    };

    let last_local = last_run.with_timezone(&tz);
    let last_date = last_local.date_naive();

    let step_days = match &policy.frequency {
        Frequency::EveryTwoDays => 2,
        Frequency::Weekly => 7,
        _ => 1,
    };

    match &policy.frequency {
        Frequency::Custom { slots } => {
            let slots = effective_slots(slots, policy.time);
            slots
                .iter()
                .map(|slot| slot_at(tz, last_date, *slot))
                .find(|candidate| *candidate > last_run)
                .unwrap_or_else(|| slot_at(tz, last_date + Duration::days(1), slots[0]))
        }
        _ => slot_at(tz, last_date + Duration::days(step_days), policy.time),
    }
}

/// The first slot strictly after `now`, ignoring run history.
fn next_slot_after(policy: &SchedulePolicy, now: DateTime<Utc>) -> DateTime<Utc> {
    let tz = policy.timezone;
    let today = now.with_timezone(&tz).date_naive();

    let slots = match &policy.frequency {
        Frequency::Custom { slots } => effective_slots(slots, policy.time),
        _ => vec![policy.time],
    };

    slots
        .iter()
        .map(|slot| slot_at(tz, today, *slot))
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| slot_at(tz, today + Duration::days(1), slots[0]))
}

fn effective_slots(slots: &[NaiveTime], fallback: NaiveTime) -> Vec<NaiveTime> {
    let mut slots = slots.to_vec();
    if slots.is_empty() {
        slots.push(fallback);
    }
    slots.sort_unstable();
    slots
}

/// Resolves a wall-clock slot to an instant. Times inside a spring-forward
/// gap move one hour later; times inside a fall-back overlap take the earlier
/// instant.
pub(crate) fn slot_at(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map_or_else(|| Utc.from_utc_datetime(&naive), |at| at.with_timezone(&Utc))
        }
    }
}
