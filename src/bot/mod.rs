pub mod polling;
pub mod replies;
pub mod telegram;

use std::{fmt, future::Future, sync::Arc};

use anyhow::Context;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::chart::{ChartPoint, render_weight_chart};
use crate::core::conversation::{ChatId, ConfirmationIntent, PendingReadings};
use crate::core::db::{Reading, WeightRepository};
use crate::detection::{DigitDetector, DigitReconstructor, Reconstruction, read_display};

use telegram::{Message, Update};

/// Rows listed by the history command.
pub const HISTORY_LIMIT: i64 = 10;

/// How far back the chart looks.
pub const CHART_WINDOW: Duration = Duration::days(365);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Outbound side of the chat service plus photo download.
pub trait ChatTransport: Send + Sync {
    fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn send_photo(
        &self,
        chat: ChatId,
        png: Vec<u8>,
        caption: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn download_photo(&self, file_id: &str) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    History,
    Chart,
    Other(String),
}

impl Command {
    /// Parse `/name` or `/name@botname`, ignoring any arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?.strip_prefix('/')?;
        let name = word.split('@').next().unwrap_or(word).to_lowercase();
        Some(match name.as_str() {
            "start" => Self::Start,
            "historial" | "history" => Self::History,
            "grafico" | "gráfico" | "chart" => Self::Chart,
            _ => Self::Other(name),
        })
    }
}

/// What a single message asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Command(Command),
    Text(String),
    Photo { file_id: String },
}

impl Incoming {
    pub fn from_message(message: &Message) -> Option<Self> {
        if let Some(photo) = message.largest_photo() {
            return Some(Self::Photo {
                file_id: photo.file_id.clone(),
            });
        }
        let text = message.text.as_deref()?;
        Some(match Command::parse(text) {
            Some(command) => Self::Command(command),
            None => Self::Text(text.to_string()),
        })
    }

}

/// Which stage of a handler failed. Attached as error context so the user reply can match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Image,
    Storage,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("photo could not be processed"),
            Self::Storage => f.write_str("database request failed"),
        }
    }
}

/// The text sent to the chat after a handler error.
pub fn failure_reply(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<Failure>() {
        Some(Failure::Image) => replies::IMAGE_FAILURE,
        Some(Failure::Storage) => replies::STORAGE_FAILURE,
        None => replies::GENERIC_FAILURE,
    }
}

/// Message handlers shared by every chat.
pub struct Bot<T, S, D> {
    transport: T,
    store: Option<S>,
    detector: Arc<D>,
    reconstructor: DigitReconstructor,
    pending: PendingReadings,
    display_offset: UtcOffset,
}

impl<T, S, D> Bot<T, S, D>
where
    T: ChatTransport,
    S: WeightRepository,
    D: DigitDetector + 'static,
{
    /// `store` is `None` when the database was unreachable at startup.
    pub fn new(transport: T, store: Option<S>, detector: Arc<D>, reconstructor: DigitReconstructor) -> Self {
        Self {
            transport,
            store,
            detector,
            reconstructor,
            pending: PendingReadings::new(),
            display_offset: UtcOffset::UTC,
        }
    }

    /// Offset used when printing timestamps back to the user.
    pub fn with_display_offset(mut self, offset: UtcOffset) -> Self {
        self.display_offset = offset;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pending(&self) -> &PendingReadings {
        &self.pending
    }

    pub async fn handle_update(&self, update: &Update) -> anyhow::Result<()> {
        let Some(message) = &update.message else {
            return Ok(());
        };
        let Some(incoming) = Incoming::from_message(message) else {
            tracing::debug!(update_id = update.update_id, "Ignoring message without text or photo");
            return Ok(());
        };
        self.handle(message.chat.id, incoming).await
    }

    /// Run one message. Handler failures are logged and reported to the chat once.
    pub async fn handle(&self, chat: ChatId, incoming: Incoming) -> anyhow::Result<()> {
        let result = match &incoming {
            Incoming::Command(Command::Start) => self.reply(chat, replies::GREETING).await,
            Incoming::Command(Command::History) => self.history(chat).await,
            Incoming::Command(Command::Chart) => self.chart(chat).await,
            Incoming::Command(Command::Other(name)) => {
                tracing::debug!(chat, command = %name, "Ignoring unknown command");
                Ok(())
            }
            Incoming::Text(text) => self.text(chat, text).await,
            Incoming::Photo { file_id } => self.photo(chat, file_id).await,
        };

        if let Err(err) = result {
            tracing::error!(chat, error = ?err, "Failed to handle message");
            self.reply(chat, failure_reply(&err)).await?;
        }
        Ok(())
    }

    async fn reply(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        self.transport.send_text(chat, text, TextFormat::Plain).await
    }

    async fn text(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        if let Some(intent) = ConfirmationIntent::parse(text) {
            if let Some(raw) = self.pending.get(chat) {
                return self.resolve_pending(chat, raw, intent).await;
            }
        }
        self.reply(chat, &replies::echo(text)).await
    }

    async fn resolve_pending(&self, chat: ChatId, raw: String, intent: ConfirmationIntent) -> anyhow::Result<()> {
        let Some(store) = &self.store else {
            self.pending.resolve(chat, &raw);
            return self.reply(chat, replies::NO_DATABASE).await;
        };

        let reading: Reading = match raw.parse() {
            Ok(reading) => reading,
            Err(err) => {
                self.pending.resolve(chat, &raw);
                tracing::warn!(chat, reading = %raw, error = %err, "Refusing to store reading");
                return self.reply(chat, &replies::invalid_reading(&raw)).await;
            }
        };

        // a failed insert leaves the reading pending so the user can answer again
        let stored = store
            .add_reading(&reading, intent.confirmed())
            .await
            .context(Failure::Storage)?;
        self.pending.resolve(chat, &raw);
        tracing::info!(chat, id = stored.id, reading = %reading, confirmed = intent.confirmed(), "Reading stored");

        let text = match intent {
            ConfirmationIntent::Affirm => replies::saved(&reading),
            ConfirmationIntent::Deny => replies::discarded(&reading),
        };
        self.reply(chat, &text).await
    }

    async fn photo(&self, chat: ChatId, file_id: &str) -> anyhow::Result<()> {
        let bytes = self
            .transport
            .download_photo(file_id)
            .await
            .context(Failure::Image)?;
        let image = image::load_from_memory(&bytes)
            .context("Failed to decode photo")
            .context(Failure::Image)?;

        let detector = Arc::clone(&self.detector);
        let reconstructor = self.reconstructor.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            read_display(detector.as_ref(), &reconstructor, &image)
        })
        .await
        .context("Detector task failed")
        .and_then(|result| result)
        .context(Failure::Image)?;

        match outcome {
            Reconstruction::NoObjects => self.reply(chat, replies::NO_OBJECTS).await,
            Reconstruction::LowConfidence => self.reply(chat, replies::LOW_CONFIDENCE).await,
            Reconstruction::Reading(reading) => {
                if let Some(previous) = self.pending.set(chat, reading.clone()) {
                    tracing::debug!(chat, previous = %previous, "Pending reading replaced");
                }
                tracing::info!(chat, reading = %reading, "Reading awaiting confirmation");
                self.reply(chat, &replies::ask_confirmation(&reading)).await
            }
        }
    }

    async fn history(&self, chat: ChatId) -> anyhow::Result<()> {
        let Some(store) = &self.store else {
            return self.reply(chat, replies::NO_DATABASE).await;
        };

        let rows = store
            .recent_readings(HISTORY_LIMIT)
            .await
            .context(Failure::Storage)?;
        if rows.is_empty() {
            return self.reply(chat, replies::EMPTY_HISTORY).await;
        }

        let text = replies::history(&rows, self.display_offset);
        self.transport.send_text(chat, &text, TextFormat::Markdown).await
    }

    async fn chart(&self, chat: ChatId) -> anyhow::Result<()> {
        let Some(store) = &self.store else {
            return self.reply(chat, replies::NO_DATABASE).await;
        };

        let since = OffsetDateTime::now_utc() - CHART_WINDOW;
        let rows = store.confirmed_since(since).await.context(Failure::Storage)?;
        if rows.is_empty() {
            return self.reply(chat, replies::NOT_ENOUGH_DATA).await;
        }

        let points: anyhow::Result<Vec<ChartPoint>> = rows
            .iter()
            .map(|row| {
                Ok(ChartPoint {
                    at: row.created.to_offset(self.display_offset),
                    value: row.reading()?.value(),
                })
            })
            .collect();
        let points = match points {
            Ok(points) => points,
            Err(err) => {
                tracing::warn!(chat, error = %err, "Stored readings are not numeric");
                return self.reply(chat, replies::NON_NUMERIC_DATA).await;
            }
        };

        let png = render_weight_chart(&points)?;
        self.transport.send_photo(chat, png, replies::CHART_CAPTION).await
    }
}
