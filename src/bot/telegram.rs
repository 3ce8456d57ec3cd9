use std::{fmt, time::Duration};

use anyhow::{Context, bail};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::bot::{ChatTransport, TextFormat};
use crate::core::conversation::ChatId;

/// Extra slack on top of the long-poll timeout before the HTTP request gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

impl Message {
    /// The largest available size of an attached photo.
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo
            .as_deref()?
            .iter()
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Debug, Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

/// Client for the Telegram Bot HTTP API.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    file_base: String,
}

impl fmt::Debug for TelegramClient {
    // the token is part of both base URLs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> anyhow::Result<Self> {
        let api_url = api_url.trim_end_matches('/');
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: format!("{}/bot{}", api_url, token),
            file_base: format!("{}/file/bot{}", api_url, token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Telegram `{}` request failed", method))?;
        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> anyhow::Result<T> {
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Telegram `{}` returned an unreadable body ({})", method, status))?;

        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => bail!(
                "Telegram `{}` failed ({}): {}",
                method,
                status,
                body.description.unwrap_or_else(|| "no description".to_string())
            ),
        }
    }

    pub async fn get_me(&self) -> anyhow::Result<User> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    /// Long-poll for new messages. `offset` acknowledges every update before it.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> anyhow::Result<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        self.call(
            "getUpdates",
            &body,
            Some(Duration::from_secs(timeout_secs) + POLL_GRACE),
        )
        .await
    }

    async fn file_path(&self, file_id: &str) -> anyhow::Result<String> {
        let info: FileInfo = self.call("getFile", &GetFile { file_id }, None).await?;
        info.file_path
            .with_context(|| format!("Telegram has no download path for file {}", file_id))
    }
}

impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat: ChatId, text: &str, format: TextFormat) -> anyhow::Result<()> {
        let body = SendMessage {
            chat_id: chat,
            text,
            parse_mode: match format {
                TextFormat::Plain => None,
                TextFormat::Markdown => Some("Markdown"),
            },
        };
        let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        tracing::debug!(chat, "Text sent");
        Ok(())
    }

    async fn send_photo(&self, chat: ChatId, png: Vec<u8>, caption: &str) -> anyhow::Result<()> {
        let photo = Part::bytes(png)
            .file_name("chart.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .http
            .post(format!("{}/sendPhoto", self.api_base))
            .multipart(form)
            .send()
            .await
            .context("Telegram `sendPhoto` request failed")?;
        let _: serde_json::Value = Self::unwrap_response("sendPhoto", response).await?;
        tracing::debug!(chat, "Photo sent");
        Ok(())
    }

    async fn download_photo(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.file_path(file_id).await?;
        let bytes = self
            .http
            .get(format!("{}/{}", self.file_base, path))
            .send()
            .await
            .context("Photo download failed")?
            .error_for_status()
            .context("Photo download rejected")?
            .bytes()
            .await
            .context("Photo download interrupted")?;
        tracing::debug!(file_id, size = bytes.len(), "Photo downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_photo_update() -> anyhow::Result<()> {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 3,
                "date": 1760000000,
                "chat": {"id": 42, "type": "private"},
                "photo": [
                    {"file_id": "small", "file_unique_id": "a", "width": 90, "height": 60},
                    {"file_id": "big", "file_unique_id": "b", "width": 1280, "height": 960, "file_size": 120000},
                    {"file_id": "mid", "file_unique_id": "c", "width": 320, "height": 240}
                ]
            }
        }))?;

        let message = update.message.expect("message present");
        assert_eq!(message.chat.id, 42);
        assert!(message.text.is_none());
        assert_eq!(message.largest_photo().map(|p| p.file_id.as_str()), Some("big"));
        Ok(())
    }

    #[test]
    fn test_update_without_message() -> anyhow::Result<()> {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 11,
            "edited_message": {"message_id": 1}
        }))?;
        assert!(update.message.is_none());
        Ok(())
    }

    #[test]
    fn test_debug_hides_token() -> anyhow::Result<()> {
        let client = TelegramClient::new("https://api.telegram.org/", "123:secret")?;
        assert!(!format!("{:?}", client).contains("secret"));
        assert_eq!(client.api_base, "https://api.telegram.org/bot123:secret");
        Ok(())
    }
}
