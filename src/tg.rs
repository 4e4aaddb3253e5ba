use crate::config::Config;
use crate::digest::build_digest;
use crate::format::format_digest_html;
use crate::scheduler::schedule_label;
use crate::storage::{rate_limit_key, Storage};
use crate::tmdb::TmdbClient;
use chrono::Utc;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    payloads::SendMessage,
    prelude::*,
    requests::JsonRequest,
    types::{ParseMode, ThreadId},
    utils::command::BotCommands,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/* ====== Команды ====== */
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "Команды:")]
pub enum Command {
    #[command(description = "подборка трендов недели")]
    Recommend,
    #[command(description = "ещё одна подборка")]
    More,
    #[command(description = "привязать бота к этой теме (владелец)")]
    BindHere,
    #[command(description = "снять привязку (владелец)")]
    Unbind,
    #[command(description = "включить авто-подборки (владелец)")]
    StartBot,
    #[command(description = "выключить авто-подборки (владелец)")]
    StopBot,
    #[command(description = "статус бота (владелец)")]
    Status,
    #[command(description = "помощь")]
    Help,
}

impl Command {
    fn owner_only(&self) -> bool {
        matches!(
            self,
            Command::BindHere | Command::Unbind | Command::StartBot | Command::StopBot | Command::Status
        )
    }
}

pub async fn run(bot: Bot, config: Arc<Config>, tmdb: TmdbClient, storage: Storage) {
    let handler = Update::filter_message().branch(
        dptree::entry()
            .filter_command::<Command>()
            .endpoint(on_command),
    );

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![config, tmdb, storage])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build();

    // Ctrl-C ловит сам диспетчер, SIGTERM (docker stop, systemd) — здесь
    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        terminate_signal().await;
        info!("SIGTERM received, stopping dispatcher");
        match token.shutdown() {
            Ok(done) => done.await,
            Err(e) => debug!(error = %e, "Dispatcher was not running"),
        }
    });

    info!("Bot started, long polling enabled");
    dispatcher.dispatch().await;
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

/// Ошибка обработчика: сбой Telegram уходит диспетчеру, сбой хранилища — пользователю.
#[derive(Debug, Error)]
enum HandlerError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    config: Arc<Config>,
    tmdb: TmdbClient,
    storage: Storage,
) -> ResponseResult<()> {
    match handle_command(&bot, &msg, cmd, &config, &tmdb, &storage).await {
        Ok(()) => Ok(()),
        Err(HandlerError::Telegram(e)) => Err(e),
        Err(HandlerError::Storage(e)) => {
            error!(chat_id = msg.chat.id.0, error = %format!("{e:#}"), "Command failed on storage");
            reply(&bot, &msg, "❌ Произошла ошибка. Попробуйте позже.").await?;
            Ok(())
        }
    }
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    cmd: Command,
    config: &Config,
    tmdb: &TmdbClient,
    storage: &Storage,
) -> Result<(), HandlerError> {
    debug!(
        chat_id = msg.chat.id.0,
        user_id = ?msg.from.as_ref().map(|u| u.id.0),
        command = ?cmd,
        "Received command"
    );

    if cmd.owner_only() && !is_owner(msg, config) {
        warn!(
            user_id = ?msg.from.as_ref().map(|u| u.id.0),
            owner_id = config.owner_id.0,
            "Unauthorized command attempt"
        );
        reply(bot, msg, "❌ Эта команда доступна только владельцу бота.").await?;
        return Ok(());
    }

    match cmd {
        Command::Help => {
            reply(bot, msg, Command::descriptions().to_string()).await?;
        }
        Command::Recommend => on_digest_command(bot, msg, "recommend", tmdb, storage).await?,
        Command::More => on_digest_command(bot, msg, "more", tmdb, storage).await?,
        Command::BindHere => bind_here(bot, msg, storage).await?,
        Command::Unbind => {
            storage.clear_binding().await?;
            info!("Bot unbound from topic");
            reply(
                bot,
                msg,
                "✅ Привязка снята!\n\nТеперь:\n• Автоматические подборки не отправляются, пока нет привязки\n• Команды работают везде",
            )
            .await?;
        }
        Command::StartBot => {
            storage.set_enabled(true).await?;
            info!("Auto mode enabled");
            let text = format!(
                "✅ Автоматический режим включён.\nПодборки будут отправляться: {}.",
                schedule_label(config.timezone)
            );
            reply(bot, msg, text).await?;
        }
        Command::StopBot => {
            storage.set_enabled(false).await?;
            info!("Auto mode disabled");
            reply(
                bot,
                msg,
                "⏸️ Автоматический режим выключен.\nПодборки не будут отправляться автоматически.",
            )
            .await?;
        }
        Command::Status => {
            let settings = storage.settings().await;
            let sent = storage.sent_count(Utc::now().timestamp()).await;
            let binding = match settings.target_chat_id {
                Some(chat) => format!(
                    "✅ chat={}, thread={}",
                    chat,
                    settings.target_thread_id.map_or("none".to_string(), |t| t.to_string())
                ),
                None => "❌ нет".to_string(),
            };
            let lines = [
                "<b>📊 Статус бота:</b>\n".to_string(),
                format!(
                    "• Авто-режим: {}",
                    if settings.enabled { "✅ включён" } else { "⏸️ выключен" }
                ),
                format!("• Привязка: {binding}"),
                format!("• Расписание: {}", schedule_label(config.timezone)),
                format!("• Отправлено за 30 дней: {sent}"),
            ];
            reply(bot, msg, lines.join("\n")).parse_mode(ParseMode::Html).await?;
        }
    }
    Ok(())
}

async fn bind_here(bot: &Bot, msg: &Message, storage: &Storage) -> Result<(), HandlerError> {
    let Some(thread) = topic_thread(msg) else {
        reply(
            bot,
            msg,
            "❌ Эта команда работает только внутри топика (темы) группы.\nНапишите её в теме \"фильмы и сериалы\".",
        )
        .await?;
        return Ok(());
    };
    let thread_id = thread.0 .0;
    storage.set_binding(msg.chat.id.0, Some(thread_id)).await?;
    info!(chat_id = msg.chat.id.0, thread_id, "Bot bound to topic");
    reply(
        bot,
        msg,
        "✅ Бот привязан к этой теме!\n\nТеперь:\n• Автоматические подборки будут отправляться сюда\n• Команды /recommend и /more работают только в этой теме",
    )
    .await?;
    Ok(())
}

/* ====== /recommend, /more ====== */
async fn on_digest_command(
    bot: &Bot,
    msg: &Message,
    action: &str,
    tmdb: &TmdbClient,
    storage: &Storage,
) -> Result<(), HandlerError> {
    let now = Utc::now().timestamp();

    // сначала rate limit, потом проверка привязки
    if let Some(user) = &msg.from {
        let key = rate_limit_key(msg.chat.id.0, user.id.0, action);
        let allowed = storage.try_acquire_rate_limit(&key, now).await?;
        if !allowed {
            debug!(chat_id = msg.chat.id.0, user_id = user.id.0, action, "Rate limit hit");
            // в личке отвечаем, в группе молчим
            if msg.chat.is_private() {
                reply(bot, msg, "⏱️ Подождите 30 секунд перед следующей командой.").await?;
            }
            return Ok(());
        }
    }

    let settings = storage.settings().await;
    let thread_id = topic_thread(msg).map(|t| t.0 .0);
    if !settings.accepts(msg.chat.id.0, thread_id) {
        debug!(chat_id = msg.chat.id.0, ?thread_id, "Ignoring command outside bound topic");
        return Ok(());
    }

    send_digest(bot, msg, tmdb, storage, now).await
}

async fn send_digest(
    bot: &Bot,
    msg: &Message,
    tmdb: &TmdbClient,
    storage: &Storage,
    now: i64,
) -> Result<(), HandlerError> {
    let selection = match build_digest(tmdb, storage, now).await {
        Ok(s) => s,
        Err(e) => {
            error!(status = ?e.status, "TMDB API unavailable");
            reply(bot, msg, "⚠️ Источник недоступен, попробуйте позже.").await?;
            return Ok(());
        }
    };

    if selection.is_empty() {
        reply(
            bot,
            msg,
            "😔 К сожалению, не удалось найти подходящий контент. Попробуйте позже.",
        )
        .await?;
        return Ok(());
    }

    reply(bot, msg, format_digest_html(&selection))
        .parse_mode(ParseMode::Html)
        .await?;

    // помечаем только то, что реально ушло в чат
    selection.commit(storage, now).await?;
    info!(
        chat_id = msg.chat.id.0,
        movies = selection.movies.len(),
        series = selection.series.len(),
        "Digest sent successfully"
    );
    Ok(())
}

/* ====== Вспомогательные ====== */

fn is_owner(msg: &Message, config: &Config) -> bool {
    msg.from.as_ref().map(|u| u.id) == Some(config.owner_id)
}

/// Тема форума, в которой написано сообщение.
fn topic_thread(msg: &Message) -> Option<ThreadId> {
    msg.thread_id.filter(|_| msg.is_topic_message)
}

/// Ответ в тот же чат и, если сообщение из темы, в ту же тему.
fn reply(bot: &Bot, msg: &Message, text: impl Into<String>) -> JsonRequest<SendMessage> {
    let req = bot.send_message(msg.chat.id, text);
    match topic_thread(msg) {
        Some(thread) => req.message_thread_id(thread),
        None => req,
    }
}
