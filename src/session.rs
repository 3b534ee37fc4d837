//! Session state and utterance recording.
//!
//! All conversation state lives in an explicit [`Session`] owned by the main
//! event loop, with its lifecycle bounded by start/stop of a recording, not
//! by process-global variables.

/// High-level client state driven by the main event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected (or ready), mic gated off
    Idle,
    /// Mic open; chunks are streamed or accumulated
    Listening,
    /// Record mode: utterance uploaded, waiting for the server
    Processing,
    /// Response audio queued for playback; mic muted to avoid echo
    Speaking,
    /// WebSocket down, reconnect in progress
    NetworkError,
}

/// Per-conversation state: current phase plus the utterance being recorded.
pub struct Session {
    pub state: SessionState,
    /// Negotiated capture format, known once the capture thread reports in.
    pub capture_rate: u32,
    pub capture_channels: u32,
    recording: Vec<i16>,
    recording_active: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            capture_rate: 0,
            capture_channels: 0,
            recording: Vec::new(),
            recording_active: false,
        }
    }

    /// True once the capture thread has reported its negotiated format.
    pub fn capture_ready(&self) -> bool {
        self.capture_rate > 0 && self.capture_channels > 0
    }

    pub fn is_recording(&self) -> bool {
        self.recording_active
    }

    /// Begin accumulating a record-mode utterance.
    pub fn start_recording(&mut self) {
        self.recording.clear();
        self.recording_active = true;
    }

    /// Append one capture chunk to the current utterance.
    pub fn push_chunk(&mut self, chunk: &[i16]) {
        if self.recording_active {
            self.recording.extend_from_slice(chunk);
        }
    }

    /// Finish the utterance and hand back its PCM.
    pub fn finish_recording(&mut self) -> Vec<i16> {
        self.recording_active = false;
        std::mem::take(&mut self.recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_accumulates_only_while_active() {
        let mut session = Session::new();
        session.push_chunk(&[1, 2, 3]);
        assert!(session.finish_recording().is_empty());

        session.start_recording();
        session.push_chunk(&[1, 2]);
        session.push_chunk(&[3]);
        assert_eq!(session.finish_recording(), vec![1, 2, 3]);
        assert!(!session.is_recording());

        // A new recording starts clean.
        session.start_recording();
        assert!(session.finish_recording().is_empty());
    }
}
