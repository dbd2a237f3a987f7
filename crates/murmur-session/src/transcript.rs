//! Incremental transcript assembly.
//!
//! The server streams transcript text in fragments. Each fragment is
//! appended to its speaker's buffer and the whole buffer is reported as a
//! partial update; at turn completion each non-empty buffer is reported
//! once as final and cleared.

use murmur_types::{Speaker, TranscriptUpdate};

#[derive(Debug, Default, Clone)]
pub struct TranscriptAggregator {
    user: String,
    model: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer_mut(&mut self, speaker: Speaker) -> &mut String {
        match speaker {
            Speaker::User => &mut self.user,
            Speaker::Model => &mut self.model,
        }
    }

    /// Text accumulated for `speaker` in the current turn.
    pub fn pending(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => &self.user,
            Speaker::Model => &self.model,
        }
    }

    /// Appends a fragment. Empty fragments change nothing and report
    /// nothing.
    pub fn append_fragment(&mut self, speaker: Speaker, text: &str) -> Option<TranscriptUpdate> {
        if text.is_empty() {
            return None;
        }
        let buffer = self.buffer_mut(speaker);
        buffer.push_str(text);
        Some(TranscriptUpdate::partial(speaker, buffer.clone()))
    }

    /// Ends the turn: model text first, then user text. Buffers are
    /// cleared; empty ones produce no update.
    pub fn finalize_turn(&mut self) -> Vec<TranscriptUpdate> {
        [Speaker::Model, Speaker::User]
            .into_iter()
            .filter_map(|speaker| {
                let text = std::mem::take(self.buffer_mut(speaker));
                (!text.is_empty()).then(|| TranscriptUpdate::final_text(speaker, text))
            })
            .collect()
    }

    /// Drops any unfinished text.
    pub fn clear(&mut self) {
        self.user.clear();
        self.model.clear();
    }
}
