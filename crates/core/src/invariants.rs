//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::models::{CurrentState, Meeting, MeetingPhase};

/// A started meeting is active exactly when it has no end time
pub fn assert_meeting_invariants(meeting: &Meeting) {
    if meeting.start_time.is_some() {
        debug_assert!(
            meeting.is_active == meeting.end_time.is_none(),
            "Meeting {} has is_active={} but end_time={:?}",
            meeting.uuid,
            meeting.is_active,
            meeting.end_time
        );
    }

    debug_assert!(
        !(meeting.phase() == MeetingPhase::Unstarted && meeting.is_active),
        "Meeting {} is active but was never started",
        meeting.uuid
    );
}

/// Activity clocks never run ahead of the highest applied index
pub fn assert_state_invariants(state: &CurrentState) {
    debug_assert!(
        state.last_activity_update <= state.last_log_index,
        "History {}/{} activity index {} is past last_log_index {}",
        state.meeting_uuid,
        state.hub_uuid,
        state.last_activity_update,
        state.last_log_index
    );

    for (badge, presence) in &state.members {
        debug_assert!(
            presence.last_activity_update <= state.last_log_index,
            "Member {} in {}/{} updated at {} past last_log_index {}",
            badge,
            state.meeting_uuid,
            state.hub_uuid,
            presence.last_activity_update,
            state.last_log_index
        );
    }
}

/// Per-field activity clocks only move forward
pub fn assert_clock_monotonic(field: &str, before: i64, after: i64) {
    debug_assert!(
        after >= before,
        "Activity clock for {} moved backwards: {} -> {}",
        field,
        before,
        after
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_meeting() -> Meeting {
        Meeting::new("P|1".to_string(), "KEY".to_string(), Uuid::new_v4(), 1.0)
    }

    #[test]
    fn test_valid_meeting_states() {
        let mut meeting = make_meeting();
        assert_meeting_invariants(&meeting);

        meeting.start_time = Some(10.0);
        meeting.is_active = true;
        assert_meeting_invariants(&meeting);

        meeting.end_time = Some(20.0);
        meeting.is_active = false;
        assert_meeting_invariants(&meeting);
    }

    #[test]
    fn test_fresh_state_is_valid() {
        let state = CurrentState::new("P|1".to_string(), "hub".to_string());
        assert_state_invariants(&state);
    }

    #[test]
    #[should_panic(expected = "moved backwards")]
    fn test_clock_regression_detected() {
        assert_clock_monotonic("hub", 5, 4);
    }

    #[test]
    #[should_panic(expected = "has is_active=true")]
    fn test_ended_but_active_detected() {
        let mut meeting = make_meeting();
        meeting.start_time = Some(10.0);
        meeting.end_time = Some(20.0);
        meeting.is_active = true;
        assert_meeting_invariants(&meeting);
    }
}
