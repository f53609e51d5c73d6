use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use crate::config::{BusinessHours, SchedulePolicy};
use crate::model::*;

// ── Slot Algorithm ────────────────────────────────────────────────

/// Bookable start times for one professional on `day`.
///
/// Candidates run from `hours.open` in steps of `granularity` while the
/// candidate is before `hours.close`. Only the start is bounded, so the last
/// slot may run past closing. A candidate is dropped when it overlaps any
/// span in `occupied`, or when `day` is today and it does not lie strictly
/// after `now`.
///
/// `occupied` must be sorted by start (see [`occupied_spans`]).
pub fn compute_available_slots(
    day: NaiveDate,
    hours: &BusinessHours,
    granularity: Minutes,
    service_duration: Minutes,
    occupied: &[Span],
    now: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    if granularity == 0 || service_duration == 0 || hours.open >= hours.close {
        return Vec::new();
    }

    let is_today = day == now.date();
    let close = day.and_time(hours.close);
    let step = minutes(granularity);

    let mut slots = Vec::new();
    let mut candidate = day.and_time(hours.open);
    while candidate < close {
        let past = is_today && candidate <= now;
        if !past && !conflicts(occupied, &Span::starting_at(candidate, service_duration)) {
            slots.push(candidate);
        }
        candidate += step;
    }
    slots
}

/// Whether `span` overlaps any of the sorted `occupied` spans.
fn conflicts(occupied: &[Span], span: &Span) -> bool {
    // Everything at index >= right_bound starts at or after span.end → can't overlap.
    let right_bound = occupied.partition_point(|o| o.start < span.end);
    occupied[..right_bound].iter().any(|o| o.end > span.start)
}

/// Occupied intervals of `barber_id`'s non-cancelled appointments, sorted by start.
pub fn occupied_spans<'a>(
    appointments: impl IntoIterator<Item = &'a Appointment>,
    barber_id: Ulid,
) -> Vec<Span> {
    let mut spans: Vec<Span> = appointments
        .into_iter()
        .filter(|a| a.barber_id == barber_id && a.occupies_schedule() && a.duration > 0)
        .map(Appointment::span)
        .collect();
    spans.sort_by_key(|s| s.start);
    spans
}

/// `[00:00, next day 00:00)` for `day`.
pub fn day_window(day: NaiveDate) -> Span {
    let start = day.and_time(NaiveTime::MIN);
    Span::new(start, start + chrono::TimeDelta::days(1))
}

/// Resolve the weekday's hours from `policy` and compute the day's slots.
/// Returns nothing on a closed day.
pub fn slots_for_day<'a>(
    day: NaiveDate,
    policy: &SchedulePolicy,
    service_duration: Minutes,
    appointments: impl IntoIterator<Item = &'a Appointment>,
    barber_id: Ulid,
    now: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    let Some(hours) = policy.hours_for(day) else {
        return Vec::new();
    };
    let occupied = occupied_spans(appointments, barber_id);
    compute_available_slots(day, &hours, policy.slot_minutes, service_duration, &occupied, now)
}

/// `"HH:MM"`, the form slots are shown and picked in.
pub fn format_slot(slot: NaiveDateTime) -> String {
    slot.format("%H:%M").to_string()
}
