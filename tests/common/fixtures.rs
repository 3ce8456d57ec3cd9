use std::{
    collections::HashMap,
    io::Cursor,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use image::{ImageBuffer, ImageFormat, Rgb};
use time::OffsetDateTime;
use weighbot::bot::telegram::Update;
use weighbot::{
    BoundingBox, ChatId, ChatTransport, Detection, DigitDetector, Reading, StoredReading,
    TextFormat, WeightRepository,
};

/// In-memory stand-in for the Postgres store. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<Vec<StoredReading>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, bypassing validation, like data written by an older version.
    pub fn insert_raw(&self, weight: &str, confirmed: Option<bool>, created: OffsetDateTime) {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(StoredReading {
            id,
            weight: weight.to_string(),
            confirmed,
            created,
        });
    }

    pub fn rows(&self) -> Vec<StoredReading> {
        self.rows.lock().unwrap().clone()
    }

    /// Make every insert fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl WeightRepository for MemoryStore {
    async fn add_reading(&self, reading: &Reading, confirmed: bool) -> anyhow::Result<StoredReading> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("connection to server was lost");
        }
        self.insert_raw(reading.as_str(), Some(confirmed), OffsetDateTime::now_utc());
        Ok(self.rows().pop().unwrap())
    }

    async fn recent_readings(&self, limit: i64) -> anyhow::Result<Vec<StoredReading>> {
        let mut rows = self.rows();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn confirmed_since(&self, since: OffsetDateTime) -> anyhow::Result<Vec<StoredReading>> {
        let mut rows: Vec<_> = self
            .rows()
            .into_iter()
            .filter(|r| r.confirmed == Some(true) && r.created > since)
            .collect();
        rows.sort_by_key(|r| r.created);
        Ok(rows)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat: ChatId,
        text: String,
        format: TextFormat,
    },
    Photo {
        chat: ChatId,
        png: Vec<u8>,
        caption: String,
    },
}

/// Records everything the bot sends and serves photos from a fixed map.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    photos: Mutex<HashMap<String, Vec<u8>>>,
    fail_next_text: AtomicBool,
}

impl RecordingTransport {
    pub fn add_photo(&self, file_id: &str, bytes: Vec<u8>) {
        self.photos.lock().unwrap().insert(file_id.to_string(), bytes);
    }

    /// The next `send_text` call errors instead of recording.
    pub fn fail_next_text(&self) {
        self.fail_next_text.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to `chat`, oldest first.
    pub fn texts(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat: c, text, .. } if c == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self, chat: ChatId) -> Option<String> {
        self.texts(chat).pop()
    }
}

impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat: ChatId, text: &str, format: TextFormat) -> anyhow::Result<()> {
        if self.fail_next_text.swap(false, Ordering::SeqCst) {
            anyhow::bail!("Telegram `sendMessage` failed (502 Bad Gateway)");
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat,
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    async fn send_photo(&self, chat: ChatId, png: Vec<u8>, caption: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Photo {
            chat,
            png,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn download_photo(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        self.photos
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown file {}", file_id))
    }
}

/// Detector that returns whatever the test scripted last.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    detections: Mutex<Vec<Detection>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedDetector {
    pub fn set(&self, detections: Vec<Detection>) {
        *self.detections.lock().unwrap() = detections;
    }

    /// Block each `detect` call for `delay`, like real inference on a large photo.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

impl DigitDetector for ScriptedDetector {
    fn detect(&self, _image: &image::DynamicImage) -> anyhow::Result<Vec<Detection>> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(self.detections.lock().unwrap().clone())
    }
}

/// A detection of `class_id` whose box starts at `x`.
pub fn symbol(class_id: u32, confidence: f32, x: f32) -> Detection {
    Detection::new(class_id, confidence, BoundingBox::new(x, 10.0, x + 20.0, 50.0))
}

/// Confident detections spelling `digits` left to right; `.` maps to the point class.
pub fn spell(digits: &str) -> Vec<Detection> {
    digits
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let class_id = c.to_digit(10).unwrap_or(weighbot::models::POINT_CLASS);
            symbol(class_id, 0.9, i as f32 * 25.0)
        })
        .collect()
}

/// Small PNG standing in for a photo of the scale.
pub fn scale_photo_png() -> Vec<u8> {
    let img = ImageBuffer::from_fn(64, 32, |x, _| Rgb([(x * 4) as u8, 40u8, 40u8]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test photo");
    bytes
}

pub fn text_update(update_id: i64, chat: ChatId, text: &str) -> Update {
    serde_json::from_value(serde_json::json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1760000000,
            "chat": {"id": chat, "type": "private"},
            "text": text
        }
    }))
    .expect("valid text update")
}

pub fn photo_update(update_id: i64, chat: ChatId, file_id: &str) -> Update {
    serde_json::from_value(serde_json::json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1760000000,
            "chat": {"id": chat, "type": "private"},
            "photo": [
                {"file_id": format!("{file_id}-thumb"), "file_unique_id": "t", "width": 32, "height": 16},
                {"file_id": file_id, "file_unique_id": "f", "width": 64, "height": 32}
            ]
        }
    }))
    .expect("valid photo update")
}

pub type TestBot = weighbot::Bot<RecordingTransport, MemoryStore, ScriptedDetector>;

/// A bot wired to fakes. Returns the shared store and detector so tests can inspect and script them.
pub fn make_bot(with_db: bool) -> (TestBot, MemoryStore, Arc<ScriptedDetector>) {
    let store = MemoryStore::new();
    let detector = Arc::new(ScriptedDetector::default());
    let transport = RecordingTransport::default();
    transport.add_photo("scale", scale_photo_png());
    transport.add_photo("broken", b"not an image".to_vec());

    let bot = weighbot::Bot::new(
        transport,
        with_db.then(|| store.clone()),
        Arc::clone(&detector),
        weighbot::DigitReconstructor::new(),
    );
    (bot, store, detector)
}
