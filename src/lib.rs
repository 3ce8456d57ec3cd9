pub mod bot;
pub mod chart;
pub mod config;
pub mod core;
pub mod detection;
pub mod logging;
pub mod models;

pub use bot::{Bot, ChatTransport, Command, Incoming, TextFormat};
pub use config::Config;
pub use crate::core::conversation::{ChatId, ConfirmationIntent, PendingReadings};
pub use crate::core::db::{Reading, StoredReading, WeightDb, WeightRepository};
pub use detection::{DigitDetector, DigitReconstructor, Reconstruction, YoloDetector};
pub use models::{BoundingBox, Detection};
