//! Bounded buffer for the idea being composed.
//!
//! Other parts of an interface can ask for the buffer to be prefilled
//! through a [`PrefillSender`]; the owner of the buffer drains those
//! requests with the matching [`PrefillReceiver`].

use tokio::sync::mpsc;

/// Maximum idea length, in characters
pub const MAX_IDEA_CHARS: usize = 1000;

/// Text the user is composing, never longer than its limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeaBuffer {
    text: String,
    max_chars: usize,
}

impl Default for IdeaBuffer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdeaBuffer {
    /// Create a buffer, optionally seeded (e.g. from the idea cache)
    pub fn new(seed: Option<&str>) -> Self {
        Self::with_limit(MAX_IDEA_CHARS, seed)
    }

    pub fn with_limit(max_chars: usize, seed: Option<&str>) -> Self {
        let mut buffer = Self {
            text: String::new(),
            max_chars,
        };
        if let Some(seed) = seed {
            buffer.set_text(seed);
        }
        buffer
    }

    /// Store `candidate`, truncated to the limit
    pub fn set_text(&mut self, candidate: &str) {
        self.text = match candidate.char_indices().nth(self.max_chars) {
            Some((cut, _)) => candidate[..cut].to_string(),
            None => candidate.to_string(),
        };
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Characters left before the limit
    pub fn remaining(&self) -> usize {
        self.max_chars.saturating_sub(self.len())
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Replace the text with a prefill request; blank requests are ignored
    pub fn apply_prefill(&mut self, idea: &str) -> bool {
        if idea.trim().is_empty() {
            return false;
        }
        self.set_text(idea);
        true
    }
}

/// Create a connected prefill sender/receiver pair
pub fn prefill_channel() -> (PrefillSender, PrefillReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PrefillSender(tx), PrefillReceiver(rx))
}

/// Handle given to collaborators that want to prefill the idea
#[derive(Debug, Clone)]
pub struct PrefillSender(mpsc::UnboundedSender<String>);

impl PrefillSender {
    /// Request a prefill; returns false once the receiver is gone
    pub fn request(&self, idea: impl Into<String>) -> bool {
        self.0.send(idea.into()).is_ok()
    }
}

#[derive(Debug)]
pub struct PrefillReceiver(mpsc::UnboundedReceiver<String>);

impl PrefillReceiver {
    /// Apply every queued request to `buffer`, returning how many took effect
    pub fn apply_pending(&mut self, buffer: &mut IdeaBuffer) -> usize {
        let mut applied = 0;
        while let Ok(idea) = self.0.try_recv() {
            if buffer.apply_prefill(&idea) {
                applied += 1;
            }
        }
        applied
    }
}
