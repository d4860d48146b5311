//! Batch validation: well-formedness first, then the gap check
//!
//! Both run before any write. A malformed batch is an error; a gap is an
//! ordinary outcome telling the hub where to resume.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Event, EventInput, EventKind};

/// Result of comparing a batch against the stored last index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOutcome {
    Accept,
    /// The hub must resend starting at `resend_from`
    MissingEvents { resend_from: i64 },
}

/// Gap check. Empty batches are heartbeats and always pass; otherwise the
/// first index may overlap what is stored but must not skip past `last + 1`.
pub fn check_contiguity(last_log_index: i64, events: &[Event]) -> BatchOutcome {
    let expected = last_log_index.saturating_add(1);
    match events.first() {
        Some(first) if first.log_index > expected => BatchOutcome::MissingEvents {
            resend_from: expected,
        },
        _ => BatchOutcome::Accept,
    }
}

/// Validate submitted events and bind them to their (hub, meeting) pair.
///
/// The whole batch is refused on the first problem so nothing from it is
/// ever partially applied.
pub fn parse_batch(hub_uuid: &str, meeting_uuid: &str, inputs: &[EventInput]) -> Result<Vec<Event>> {
    let recorded_at = Utc::now();
    let mut previous: Option<i64> = None;

    inputs
        .iter()
        .enumerate()
        .map(|(position, input)| {
            let kind = input.kind.trim();
            if kind.is_empty() {
                return Err(Error::malformed(position, "event type is empty"));
            }
            if input.log_index < 0 {
                return Err(Error::malformed(
                    position,
                    format!("negative log_index {}", input.log_index),
                ));
            }
            if !input.log_timestamp.is_finite() || input.log_timestamp < 0.0 {
                return Err(Error::malformed(
                    position,
                    format!("invalid log_timestamp {}", input.log_timestamp),
                ));
            }
            if let Some(prev) = previous {
                if prev.checked_add(1) != Some(input.log_index) {
                    return Err(Error::malformed(
                        position,
                        format!("log_index {} does not follow {}", input.log_index, prev),
                    ));
                }
            }
            previous = Some(input.log_index);

            let event = Event {
                hub_uuid: hub_uuid.to_string(),
                meeting_uuid: meeting_uuid.to_string(),
                kind: EventKind::from(kind),
                log_index: input.log_index,
                log_timestamp: input.log_timestamp,
                data: input.data.clone(),
                recorded_at,
            };
            if event.kind.is_member_event() && event.badge().map_or(true, str::is_empty) {
                return Err(Error::malformed(
                    position,
                    format!("'{}' event has no data.badge", event.kind),
                ));
            }
            Ok(event)
        })
        .collect()
}
