use serde::{Deserialize, Serialize};

/// Escalation texts sent in rotation, plus the one terminal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCycle {
    texts: Vec<String>,
    final_text: String,
}

impl MessageCycle {
    /// Returns `None` when `texts` is empty.
    pub fn new(texts: Vec<String>, final_text: impl Into<String>) -> Option<Self> {
        if texts.is_empty() {
            return None;
        }
        Some(Self {
            texts,
            final_text: final_text.into(),
        })
    }

    /// Text for `cursor`, wrapping modulo the cycle length.
    pub fn at(&self, cursor: usize) -> &str {
        &self.texts[cursor % self.texts.len()]
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

impl Default for MessageCycle {
    fn default() -> Self {
        Self {
            texts: crate::storage::default_message_cycle(),
            final_text: crate::storage::default_final_message(),
        }
    }
}
