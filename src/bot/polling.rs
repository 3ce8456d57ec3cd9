use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinSet};

use crate::bot::{Bot, ChatTransport, telegram::TelegramClient, telegram::Update};
use crate::core::conversation::ChatId;
use crate::core::db::WeightRepository;
use crate::detection::DigitDetector;

/// Seconds Telegram holds a `getUpdates` call open when nothing arrives.
pub const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

/// One worker per chat. Updates of a chat run strictly in arrival order while
/// different chats proceed independently.
pub struct ChatQueues<T, S, D> {
    bot: Arc<Bot<T, S, D>>,
    queues: HashMap<ChatId, mpsc::UnboundedSender<Update>>,
    workers: JoinSet<()>,
}

impl<T, S, D> ChatQueues<T, S, D>
where
    T: ChatTransport + 'static,
    S: WeightRepository + 'static,
    D: DigitDetector + 'static,
{
    pub fn new(bot: Arc<Bot<T, S, D>>) -> Self {
        Self {
            bot,
            queues: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    /// Queue an update behind earlier ones from the same chat.
    pub fn dispatch(&mut self, update: Update) {
        let Some(chat) = update.message.as_ref().map(|m| m.chat.id) else {
            tracing::debug!(update_id = update.update_id, "Ignoring update without message");
            return;
        };

        let workers = &mut self.workers;
        let bot = &self.bot;
        let queue = self.queues.entry(chat).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            workers.spawn(chat_worker(Arc::clone(bot), chat, rx));
            tx
        });

        if let Err(err) = queue.send(update) {
            tracing::error!(chat, update_id = err.0.update_id, "Chat worker is gone, update dropped");
            self.queues.remove(&chat);
        }
    }

    /// Close every queue and wait for the updates already accepted to finish.
    pub async fn shutdown(mut self) {
        self.queues.clear();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = ?err, "Chat worker panicked");
            }
        }
    }
}

async fn chat_worker<T, S, D>(bot: Arc<Bot<T, S, D>>, chat: ChatId, mut rx: mpsc::UnboundedReceiver<Update>)
where
    T: ChatTransport,
    S: WeightRepository,
    D: DigitDetector + 'static,
{
    while let Some(update) = rx.recv().await {
        if let Err(err) = bot.handle_update(&update).await {
            tracing::error!(chat, update_id = update.update_id, error = ?err, "Update failed");
        }
    }
}

/// Long-poll Telegram until Ctrl-C, then let queued updates finish.
pub async fn run_polling<S, D>(bot: Arc<Bot<TelegramClient, S, D>>) -> anyhow::Result<()>
where
    S: WeightRepository + 'static,
    D: DigitDetector + 'static,
{
    let mut offset: Option<i64> = None;
    let mut queues = ChatQueues::new(Arc::clone(&bot));
    tracing::info!("Bot polling for updates");

    loop {
        let updates = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested, finishing queued updates");
                break;
            }
            updates = bot.transport().get_updates(offset, POLL_TIMEOUT_SECS) => updates,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(err) => {
                tracing::warn!(error = ?err, "getUpdates failed, retrying shortly");
                tokio::time::sleep(POLL_ERROR_PAUSE).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            queues.dispatch(update);
        }
    }

    queues.shutdown().await;
    Ok(())
}
