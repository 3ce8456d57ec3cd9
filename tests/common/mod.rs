#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from weighbot for tests
pub use weighbot::bot::replies;
pub use weighbot::{
    ChatTransport, ConfirmationIntent, Reading, StoredReading, TextFormat, WeightRepository,
};
