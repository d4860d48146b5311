//! Current-state projector
//!
//! Folds newly inserted events into the meeting, the submitting hub and the
//! (meeting, hub) history. Every state field carries the log index of the
//! event that last wrote it; an older or equal index never overwrites.

use crate::invariants::{assert_clock_monotonic, assert_meeting_invariants, assert_state_invariants};
use crate::models::{CurrentState, Event, EventKind, Hub, Meeting, MeetingPhase, MemberPresence};

use super::lifecycle::{self, Transition};

/// What applying one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Some field of the meeting, hub or history changed
    Changed,
    /// A newer index already owns the field
    Stale,
    /// The meeting has ended and the event cannot affect it
    Ignored,
    /// No projection for this event type; only the log and index advance
    Recorded,
}

/// Mutable view over everything one batch may touch
pub struct Projector<'a> {
    meeting: &'a mut Meeting,
    hub: &'a mut Hub,
    state: &'a mut CurrentState,
}

impl<'a> Projector<'a> {
    pub fn new(meeting: &'a mut Meeting, hub: &'a mut Hub, state: &'a mut CurrentState) -> Self {
        Self {
            meeting,
            hub,
            state,
        }
    }

    pub fn apply(&mut self, event: &Event) -> Effect {
        let before = self.state.last_log_index;
        let effect = match &event.kind {
            EventKind::MeetingStarted => {
                lifecycle_effect(lifecycle::on_meeting_started(self.meeting, event.log_timestamp))
            }
            EventKind::HubJoined => self.hub_joined(event),
            EventKind::HubLeft => self.hub_left(event),
            EventKind::MemberJoined => self.member(event, true),
            EventKind::MemberLeft => self.member(event, false),
            EventKind::MeetingEnded => self.meeting_ended(event),
            EventKind::Other(_) => Effect::Recorded,
        };

        self.state.last_log_index = self.state.last_log_index.max(event.log_index);
        self.record_update(event);

        assert_clock_monotonic(&self.state.hub_uuid, before, self.state.last_log_index);
        assert_state_invariants(self.state);
        assert_meeting_invariants(self.meeting);
        effect
    }

    fn hub_joined(&mut self, event: &Event) -> Effect {
        if event.log_index <= self.state.last_activity_update {
            return Effect::Stale;
        }
        lifecycle::on_hub_joined(self.meeting, event.log_timestamp);
        if self.meeting.phase() == MeetingPhase::Ended {
            return Effect::Ignored;
        }
        self.hub.current_meeting = Some(self.meeting.uuid.clone());
        self.state.is_active = true;
        self.state.last_activity_update = event.log_index;
        Effect::Changed
    }

    fn hub_left(&mut self, event: &Event) -> Effect {
        if event.log_index <= self.state.last_activity_update {
            return Effect::Stale;
        }
        self.detach_hub();
        self.state.is_active = false;
        self.state.last_activity_update = event.log_index;
        Effect::Changed
    }

    fn member(&mut self, event: &Event, is_active: bool) -> Effect {
        let Some(badge) = event.badge() else {
            return Effect::Recorded;
        };
        let newer = self
            .state
            .members
            .get(badge)
            .map_or(true, |presence| event.log_index > presence.last_activity_update);
        if !newer {
            return Effect::Stale;
        }
        self.state.members.insert(
            badge.to_string(),
            MemberPresence {
                is_active,
                last_activity_update: event.log_index,
            },
        );
        Effect::Changed
    }

    fn meeting_ended(&mut self, event: &Event) -> Effect {
        let transition = lifecycle::on_meeting_ended(self.meeting, event.log_timestamp);
        let detached = self.detach_hub();
        if transition.changed() || detached {
            Effect::Changed
        } else {
            Effect::Ignored
        }
    }

    /// Clear the hub's meeting pointer if it points at this meeting
    fn detach_hub(&mut self) -> bool {
        if self.hub.is_in_meeting(&self.meeting.uuid) {
            self.hub.current_meeting = None;
            true
        } else {
            false
        }
    }

    /// Track the most recent event (by hub clock) seen for the meeting
    fn record_update(&mut self, event: &Event) {
        let newer = self
            .meeting
            .last_update_timestamp
            .map_or(true, |ts| event.log_timestamp >= ts);
        if newer {
            self.meeting.last_update_timestamp = Some(event.log_timestamp);
            self.meeting.last_update_index = Some(event.log_index);
        }
    }
}

fn lifecycle_effect(transition: Transition) -> Effect {
    if transition.changed() {
        Effect::Changed
    } else {
        Effect::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        meeting: Meeting,
        hub: Hub,
        state: CurrentState,
    }

    impl Fixture {
        fn new() -> Self {
            let project = Uuid::new_v4();
            let meeting = Meeting::new("LAB|1".into(), "K".into(), project, 1.0);
            let hub = Hub::new("H".into(), "Hub".into(), project);
            let state = CurrentState::new(meeting.uuid.clone(), hub.uuid.clone());
            Self { meeting, hub, state }
        }

        fn apply(&mut self, event: &Event) -> Effect {
            Projector::new(&mut self.meeting, &mut self.hub, &mut self.state).apply(event)
        }
    }

    fn event(kind: &str, log_index: i64, ts: f64) -> Event {
        Event {
            hub_uuid: "H".into(),
            meeting_uuid: "LAB|1".into(),
            kind: EventKind::from(kind),
            log_index,
            log_timestamp: ts,
            data: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    fn member_event(kind: &str, log_index: i64, badge: &str) -> Event {
        let mut e = event(kind, log_index, 100.0 + log_index as f64);
        e.data = json!({ "badge": badge });
        e
    }

    #[test]
    fn test_scenario_join_member_leave_end() {
        let mut f = Fixture::new();

        assert_eq!(f.apply(&event("hub joined", 0, 100.0)), Effect::Changed);
        assert!(f.state.is_active);
        assert_eq!(f.meeting.start_time, Some(100.0));
        assert!(f.meeting.is_active);
        assert!(f.hub.is_in_meeting("LAB|1"));

        f.apply(&member_event("member joined", 1, "badge123"));
        assert!(f.state.members["badge123"].is_active);

        f.apply(&event("hub left", 2, 200.0));
        assert!(!f.state.is_active);
        assert_eq!(f.hub.current_meeting, None);

        assert_eq!(f.apply(&event("meeting ended", 3, 205.0)), Effect::Changed);
        assert!(!f.meeting.is_active);
        assert_eq!(f.meeting.end_time, Some(205.0));
        assert_eq!(f.state.last_log_index, 3);
        assert_eq!(f.meeting.last_update_timestamp, Some(205.0));
        assert_eq!(f.meeting.last_update_index, Some(3));
    }

    #[test]
    fn test_member_left_at_10_beats_joined_at_8() {
        let mut forward = Fixture::new();
        forward.apply(&member_event("member joined", 8, "B"));
        forward.apply(&member_event("member left", 10, "B"));

        let mut reversed = Fixture::new();
        reversed.apply(&member_event("member left", 10, "B"));
        assert_eq!(
            reversed.apply(&member_event("member joined", 8, "B")),
            Effect::Stale
        );

        for f in [&forward, &reversed] {
            let presence = f.state.members["B"];
            assert!(!presence.is_active);
            assert_eq!(presence.last_activity_update, 10);
            assert_eq!(f.state.last_log_index, 10);
        }
    }

    #[test]
    fn test_stale_hub_event_is_skipped_but_index_advances() {
        let mut f = Fixture::new();
        f.apply(&event("hub left", 5, 10.0));
        assert_eq!(f.apply(&event("hub joined", 4, 9.0)), Effect::Stale);
        assert!(!f.state.is_active);
        assert_eq!(f.state.last_activity_update, 5);
        assert_eq!(f.meeting.start_time, None);
    }

    #[test]
    fn test_unknown_type_only_moves_index() {
        let mut f = Fixture::new();
        assert_eq!(f.apply(&event("accelerometer", 0, 1.0)), Effect::Recorded);
        assert_eq!(f.state.last_log_index, 0);
        assert_eq!(f.state.last_activity_update, -1);
        assert_eq!(f.meeting.phase(), MeetingPhase::Unstarted);
    }

    #[test]
    fn test_join_after_end_does_not_reactivate() {
        let mut f = Fixture::new();
        f.apply(&event("hub joined", 0, 100.0));
        f.apply(&event("meeting ended", 1, 150.0));
        assert_eq!(f.hub.current_meeting, None);

        assert_eq!(f.apply(&event("hub joined", 2, 160.0)), Effect::Ignored);
        assert_eq!(f.apply(&event("meeting started", 3, 170.0)), Effect::Ignored);
        assert!(!f.meeting.is_active);
        assert_eq!(f.meeting.phase(), MeetingPhase::Ended);
        assert_eq!(f.hub.current_meeting, None);
        assert_eq!(f.state.last_log_index, 3);

        // Member events still land in the history
        assert_eq!(f.apply(&member_event("member left", 4, "B")), Effect::Changed);
    }

    #[test]
    fn test_hub_left_keeps_pointer_to_other_meeting() {
        let mut f = Fixture::new();
        f.hub.current_meeting = Some("LAB|2".into());
        f.apply(&event("hub left", 0, 1.0));
        assert_eq!(f.hub.current_meeting.as_deref(), Some("LAB|2"));
    }
}
