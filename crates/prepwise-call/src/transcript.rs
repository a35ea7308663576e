use prepwise_core::types::SavedMessage;

use crate::voice_session::{TranscriptType, VoiceMessage};

/// Append-only record of finalized utterances.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<SavedMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` if it is a final transcript fragment.
    ///
    /// Returns the appended entry; partial fragments and other message types
    /// are ignored.
    pub fn accept(&mut self, message: &VoiceMessage) -> Option<&SavedMessage> {
        match message {
            VoiceMessage::Transcript {
                role,
                transcript_type: TranscriptType::Final,
                transcript,
            } => {
                self.messages.push(SavedMessage::new(*role, transcript.clone()));
                self.messages.last()
            }
            _ => None,
        }
    }

    pub fn messages(&self) -> &[SavedMessage] {
        &self.messages
    }

    /// Content of the most recent entry, for live display.
    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Hand the entries off, leaving the transcript empty.
    pub fn take(&mut self) -> Vec<SavedMessage> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwise_core::types::MessageRole;

    #[test]
    fn test_only_final_fragments_are_kept() {
        let mut t = Transcript::new();
        assert!(t.accept(&VoiceMessage::partial_transcript(MessageRole::User, "I have")).is_none());
        assert!(t.accept(&VoiceMessage::Other).is_none());
        assert!(t.is_empty());
        assert_eq!(t.last_message(), None);

        let added = t
            .accept(&VoiceMessage::final_transcript(MessageRole::User, "I have five years"))
            .cloned();
        assert_eq!(added, Some(SavedMessage::new(MessageRole::User, "I have five years")));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_order_and_last_message() {
        let mut t = Transcript::new();
        t.accept(&VoiceMessage::final_transcript(MessageRole::Assistant, "Hi"));
        t.accept(&VoiceMessage::final_transcript(MessageRole::User, "Hello"));
        t.accept(&VoiceMessage::partial_transcript(MessageRole::Assistant, "So"));
        t.accept(&VoiceMessage::final_transcript(MessageRole::Assistant, "So, Rust?"));

        let contents: Vec<&str> = t.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hi", "Hello", "So, Rust?"]);
        assert_eq!(t.last_message(), Some("So, Rust?"));
    }

    #[test]
    fn test_take_drains() {
        let mut t = Transcript::new();
        t.accept(&VoiceMessage::final_transcript(MessageRole::User, "one"));
        let taken = t.take();
        assert_eq!(taken.len(), 1);
        assert!(t.is_empty());
    }
}
