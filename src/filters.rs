use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Months, Utc};

use crate::models::{Event, FilterSpec, Period};

/// Returns the events matching every criterion in `spec`, in input order.
///
/// Period windows are anchored at `now` and include both ends. Events whose
/// date cannot be parsed never pass a period filter.
pub fn apply(events: &[Event], spec: &FilterSpec, now: DateTime<Utc>) -> Vec<Event> {
    let search = spec.search.trim().to_lowercase();
    let window = period_window(spec.period, now);

    events
        .iter()
        .filter(|event| search.is_empty() || matches_search(event, &search))
        .filter(|event| {
            spec.state.is_empty() || event.state.as_deref() == Some(spec.state.as_str())
        })
        .filter(|event| {
            spec.city.is_empty() || event.city.as_deref() == Some(spec.city.as_str())
        })
        .filter(|event| match window {
            None => true,
            Some((start, end)) => event
                .starts_at()
                .map(|at| at >= start && at <= end)
                .unwrap_or(false),
        })
        .filter(|event| !spec.free_only || event.is_free)
        .cloned()
        .collect()
}

pub fn apply_now(events: &[Event], spec: &FilterSpec) -> Vec<Event> {
    apply(events, spec, Utc::now())
}

fn matches_search(event: &Event, term: &str) -> bool {
    event.title.to_lowercase().contains(term)
        || event.description.to_lowercase().contains(term)
        || event.location.to_lowercase().contains(term)
}

fn period_window(period: Period, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    match period {
        Period::All => None,
        // Out-of-range arithmetic leaves the window without an upper bound.
        Period::Week => Some((
            now,
            now.checked_add_signed(Duration::days(7))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )),
        // chrono clamps the day to the last day of a shorter month.
        Period::Month => Some((
            now,
            now.checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )),
    }
}

/// Distinct states present in `events`, sorted.
pub fn available_states(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| event.state.as_deref())
        .map(str::trim)
        .filter(|state| !state.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct cities of the events located in `state`, sorted.
pub fn available_cities(events: &[Event], state: &str) -> Vec<String> {
    if state.is_empty() {
        return Vec::new();
    }
    events
        .iter()
        .filter(|event| event.state.as_deref() == Some(state))
        .filter_map(|event| event.city.as_deref())
        .map(str::trim)
        .filter(|city| !city.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Result header. Only a search with no hits reads as "No events found".
pub fn summary_label(count: usize, spec: &FilterSpec) -> String {
    match count {
        0 if !spec.search.trim().is_empty() => "No events found".to_string(),
        1 => "1 event found".to_string(),
        n => format!("{n} events found"),
    }
}

/// Title of the empty-list panel: narrowed listings and an empty catalogue
/// read differently.
pub fn empty_state_label(spec: &FilterSpec) -> &'static str {
    if spec.is_active() {
        "No events found"
    } else {
        "No events available"
    }
}
