// Event stream assertions for integration tests

use scyllactl::events::{Event, EventKind, EventPayload};
use scyllactl::replace::ReplacePhase;

/// Messages of all events of one kind, in order.
pub fn messages(events: &[Event], kind: EventKind) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.message.clone())
        .collect()
}

/// Phases announced by replacement Status events, in order.
pub fn phases(events: &[Event]) -> Vec<ReplacePhase> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            Some(EventPayload::Phase { phase, .. }) => Some(*phase),
            _ => None,
        })
        .collect()
}

/// Panic unless `needle` occurs as a progress message.
pub fn assert_progress(events: &[Event], needle: &str) {
    let progress = messages(events, EventKind::Progress);
    assert!(
        progress.iter().any(|m| m.contains(needle)),
        "no progress event containing {:?} in {:#?}",
        needle,
        progress
    );
}

/// Panic unless the stream ends with an event of `kind`.
pub fn assert_last_kind(events: &[Event], kind: EventKind) -> &Event {
    let last = events.last().expect("event stream is empty");
    assert_eq!(last.kind, kind, "unexpected last event {:#?}", last);
    last
}

/// Timestamps never go backwards.
pub fn assert_ordered(events: &[Event]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "events out of order: {:?} then {:?}",
            pair[0].message,
            pair[1].message
        );
    }
}
