//! Integration tests for the photo -> confirm -> store conversation.
//!
//! Tests cover:
//! - Asking for confirmation after a successful read
//! - Affirmative and negative replies persisting the reading
//! - Unrelated text being echoed without touching the pending reading
//! - Pending readings kept per chat
//! - Missing database and invalid readings

mod common;

use common::*;

const CHAT: i64 = 42;

async fn send_photo(bot: &TestBot, update_id: i64, chat: i64) -> anyhow::Result<()> {
    bot.handle_update(&photo_update(update_id, chat, "scale")).await
}

async fn send_text(bot: &TestBot, update_id: i64, chat: i64, text: &str) -> anyhow::Result<()> {
    bot.handle_update(&text_update(update_id, chat, text)).await
}

#[tokio::test]
async fn test_photo_asks_for_confirmation() -> anyhow::Result<()> {
    let (bot, store, detector) = make_bot(true);
    detector.set(spell("1234"));

    send_photo(&bot, 1, CHAT).await?;

    assert_eq!(bot.pending().get(CHAT), Some("12.34".to_string()));
    assert_eq!(
        bot.transport().last_text(CHAT),
        Some(replies::ask_confirmation("12.34"))
    );
    assert!(store.rows().is_empty(), "nothing is stored before confirmation");
    Ok(())
}

#[tokio::test]
async fn test_affirmative_replies_store_confirmed() -> anyhow::Result<()> {
    for (i, reply) in ["si", "sí", "s", "SI", "Sí"].iter().enumerate() {
        let (bot, store, detector) = make_bot(true);
        detector.set(spell("12.34"));
        send_photo(&bot, 1, CHAT).await?;

        send_text(&bot, 2 + i as i64, CHAT, reply).await?;

        let rows = store.rows();
        assert_eq!(rows.len(), 1, "reply {reply:?}");
        assert_eq!(rows[0].weight, "12.34");
        assert_eq!(rows[0].confirmed, Some(true));
        assert_eq!(bot.pending().get(CHAT), None);

        let saved = replies::saved(&"12.34".parse::<Reading>()?);
        assert_eq!(bot.transport().last_text(CHAT), Some(saved));
    }
    Ok(())
}

#[tokio::test]
async fn test_negative_replies_store_unconfirmed() -> anyhow::Result<()> {
    for reply in ["no", "n", "NO"] {
        let (bot, store, detector) = make_bot(true);
        detector.set(spell("12.34"));
        send_photo(&bot, 1, CHAT).await?;

        send_text(&bot, 2, CHAT, reply).await?;

        let rows = store.rows();
        assert_eq!(rows.len(), 1, "reply {reply:?}");
        assert_eq!(rows[0].confirmed, Some(false));
        assert_eq!(bot.pending().get(CHAT), None);

        let discarded = replies::discarded(&"12.34".parse::<Reading>()?);
        assert_eq!(bot.transport().last_text(CHAT), Some(discarded));
    }
    Ok(())
}

#[tokio::test]
async fn test_other_text_is_echoed_and_keeps_pending() -> anyhow::Result<()> {
    let (bot, store, detector) = make_bot(true);
    detector.set(spell("12.34"));
    send_photo(&bot, 1, CHAT).await?;

    send_text(&bot, 2, CHAT, "quizás").await?;

    assert_eq!(bot.pending().get(CHAT), Some("12.34".to_string()));
    assert_eq!(bot.transport().last_text(CHAT), Some(replies::echo("quizás")));
    assert!(store.rows().is_empty());

    // the reading is still confirmable afterwards
    send_text(&bot, 3, CHAT, "si").await?;
    assert_eq!(store.rows().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_yes_without_pending_is_echoed() -> anyhow::Result<()> {
    let (bot, store, _detector) = make_bot(true);

    send_text(&bot, 1, CHAT, "si").await?;

    assert_eq!(bot.transport().last_text(CHAT), Some(replies::echo("si")));
    assert!(store.rows().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_new_photo_overwrites_pending() -> anyhow::Result<()> {
    let (bot, store, detector) = make_bot(true);
    detector.set(spell("1234"));
    send_photo(&bot, 1, CHAT).await?;

    detector.set(spell("8050"));
    send_photo(&bot, 2, CHAT).await?;
    assert_eq!(bot.pending().get(CHAT), Some("80.50".to_string()));

    send_text(&bot, 3, CHAT, "s").await?;
    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].weight, "80.50");
    Ok(())
}

#[tokio::test]
async fn test_pending_readings_are_per_chat() -> anyhow::Result<()> {
    let (bot, store, detector) = make_bot(true);
    detector.set(spell("1234"));
    send_photo(&bot, 1, 1).await?;
    detector.set(spell("5678"));
    send_photo(&bot, 2, 2).await?;

    // chat 2 answering must not touch chat 1's reading
    send_text(&bot, 3, 2, "no").await?;
    assert_eq!(bot.pending().get(1), Some("12.34".to_string()));
    assert_eq!(bot.pending().get(2), None);

    send_text(&bot, 4, 1, "si").await?;

    let rows = store.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].weight.as_str(), rows[0].confirmed), ("56.78", Some(false)));
    assert_eq!((rows[1].weight.as_str(), rows[1].confirmed), ("12.34", Some(true)));
    Ok(())
}

#[tokio::test]
async fn test_confirmation_without_database() -> anyhow::Result<()> {
    let (bot, _store, detector) = make_bot(false);
    detector.set(spell("1234"));
    send_photo(&bot, 1, CHAT).await?;

    send_text(&bot, 2, CHAT, "si").await?;

    assert_eq!(bot.transport().last_text(CHAT), Some(replies::NO_DATABASE.to_string()));
    assert_eq!(bot.pending().get(CHAT), None);
    Ok(())
}

#[tokio::test]
async fn test_invalid_reading_is_not_stored() -> anyhow::Result<()> {
    let (bot, store, detector) = make_bot(true);
    detector.set(spell("1.2.3"));
    send_photo(&bot, 1, CHAT).await?;
    assert_eq!(bot.pending().get(CHAT), Some("1.2.3".to_string()));

    send_text(&bot, 2, CHAT, "si").await?;

    assert!(store.rows().is_empty());
    assert_eq!(
        bot.transport().last_text(CHAT),
        Some(replies::invalid_reading("1.2.3"))
    );
    assert_eq!(bot.pending().get(CHAT), None);
    Ok(())
}

#[tokio::test]
async fn test_failed_insert_keeps_reading_pending() -> anyhow::Result<()> {
    let (bot, store, detector) = make_bot(true);
    detector.set(spell("1234"));
    send_photo(&bot, 1, CHAT).await?;

    store.set_fail_writes(true);
    send_text(&bot, 2, CHAT, "si").await?;

    assert!(store.rows().is_empty());
    assert_eq!(bot.pending().get(CHAT), Some("12.34".to_string()));
    assert_eq!(
        bot.transport().last_text(CHAT),
        Some(replies::STORAGE_FAILURE.to_string())
    );

    // answering again once the database is back stores the same reading
    store.set_fail_writes(false);
    send_text(&bot, 3, CHAT, "si").await?;

    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].weight.as_str(), rows[0].confirmed), ("12.34", Some(true)));
    assert_eq!(bot.pending().get(CHAT), None);
    Ok(())
}
