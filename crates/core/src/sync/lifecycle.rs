//! Meeting lifecycle: Unstarted -> Active -> Ended
//!
//! The phase is derived from the meeting's own fields, so there is no separate
//! state column to keep in step. Ended is terminal.

use crate::models::{Meeting, MeetingPhase};

/// Effect of a lifecycle event on a meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unstarted -> Active
    Started,
    /// Already active; start time restamped
    Restarted,
    /// Active or Unstarted -> Ended
    Ended,
    /// Nothing changed
    Unchanged,
}

impl Transition {
    pub fn changed(self) -> bool {
        self != Transition::Unchanged
    }
}

/// "meeting started" stamps the start time unless the meeting is over
pub fn on_meeting_started(meeting: &mut Meeting, timestamp: f64) -> Transition {
    match meeting.phase() {
        MeetingPhase::Ended => Transition::Unchanged,
        MeetingPhase::Unstarted => {
            start(meeting, timestamp);
            Transition::Started
        }
        MeetingPhase::Active => {
            if meeting.start_time == Some(timestamp) {
                return Transition::Unchanged;
            }
            start(meeting, timestamp);
            Transition::Restarted
        }
    }
}

/// "hub joined" only starts a meeting that has not started yet
pub fn on_hub_joined(meeting: &mut Meeting, timestamp: f64) -> Transition {
    match meeting.phase() {
        MeetingPhase::Unstarted => {
            start(meeting, timestamp);
            Transition::Started
        }
        MeetingPhase::Active | MeetingPhase::Ended => Transition::Unchanged,
    }
}

/// "meeting ended" closes the meeting once; later ends keep the first end time
pub fn on_meeting_ended(meeting: &mut Meeting, timestamp: f64) -> Transition {
    match meeting.phase() {
        MeetingPhase::Ended => Transition::Unchanged,
        phase => {
            if phase == MeetingPhase::Unstarted {
                // Zero-length meeting
                meeting.start_time = Some(timestamp);
            }
            meeting.end_time = Some(timestamp);
            meeting.is_active = false;
            Transition::Ended
        }
    }
}

fn start(meeting: &mut Meeting, timestamp: f64) {
    meeting.start_time = Some(timestamp);
    meeting.is_active = true;
}
