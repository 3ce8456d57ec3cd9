use std::collections::HashMap;
use std::sync::Mutex;

pub type ChatId = i64;

/// What a plain-text reply means while a reading waits for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationIntent {
    Affirm,
    Deny,
}

impl ConfirmationIntent {
    /// Resolve a reply, ignoring case and surrounding whitespace. `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "si" | "sí" | "s" => Some(Self::Affirm),
            "no" | "n" => Some(Self::Deny),
            _ => None,
        }
    }

    pub fn confirmed(self) -> bool {
        matches!(self, Self::Affirm)
    }
}

/// Readings waiting for a yes/no, one slot per chat.
#[derive(Debug, Default)]
pub struct PendingReadings {
    slots: Mutex<HashMap<ChatId, String>>,
}

impl PendingReadings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reading for `chat`, returning the one it replaced.
    pub fn set(&self, chat: ChatId, reading: String) -> Option<String> {
        self.lock().insert(chat, reading)
    }

    pub fn get(&self, chat: ChatId) -> Option<String> {
        self.lock().get(&chat).cloned()
    }

    pub fn take(&self, chat: ChatId) -> Option<String> {
        self.lock().remove(&chat)
    }

    /// Clear `chat`'s slot only if it still holds `reading`. A newer photo is left in place.
    pub fn resolve(&self, chat: ChatId, reading: &str) -> bool {
        let mut slots = self.lock();
        if slots.get(&chat).is_some_and(|current| current == reading) {
            slots.remove(&chat);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, String>> {
        // a panic while holding the map cannot leave it half-written
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
