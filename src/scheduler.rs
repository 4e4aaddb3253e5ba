use crate::digest::build_digest;
use crate::format::format_digest_html;
use crate::storage::{Settings, Storage, DEDUP_WINDOW_SECS, RATE_LIMIT_RETENTION_SECS};
use crate::tmdb::TmdbClient;
use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ThreadId};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Каждую пятницу в 18:00 (сек мин час день месяц день_недели).
pub const WEEKLY_CRON: &str = "0 0 18 * * Fri";
const DIGEST_WEEKDAY: Weekday = Weekday::Fri;
const DIGEST_HOUR: i64 = 18;
const MAINTENANCE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Регистрирует еженедельную подборку и ежедневную чистку, сразу делает первую чистку.
pub async fn start(bot: Bot, tmdb: TmdbClient, storage: Storage, tz: Tz) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let weekly = scheduler
        .add(weekly_digest_job(bot, tmdb, storage.clone(), tz)?)
        .await?;
    scheduler.add(maintenance_job(storage.clone())?).await?;
    scheduler.start().await?;

    info!(
        job_id = %weekly,
        cron = WEEKLY_CRON,
        timezone = %tz,
        next_run = ?next_weekly_run(Utc::now(), tz).map(|t| t.with_timezone(&tz)),
        "Weekly digest job scheduled"
    );

    if let Err(e) = sweep(&storage, Utc::now().timestamp()).await {
        error!(error = %e, "Maintenance sweep failed");
    }
    Ok(scheduler)
}

pub fn weekly_digest_job(bot: Bot, tmdb: TmdbClient, storage: Storage, tz: Tz) -> anyhow::Result<Job> {
    let job = Job::new_async_tz(WEEKLY_CRON, tz, move |_id, _scheduler| {
        let bot = bot.clone();
        let tmdb = tmdb.clone();
        let storage = storage.clone();
        Box::pin(async move {
            info!(timezone = %tz, "Running weekly digest job");
            if let Err(e) = send_auto_digest(&bot, &tmdb, &storage, Utc::now().timestamp()).await {
                error!(error = %e, "Weekly digest job failed");
            }
        })
    })?;
    Ok(job)
}

pub fn maintenance_job(storage: Storage) -> anyhow::Result<Job> {
    let job = Job::new_repeated_async(MAINTENANCE_PERIOD, move |_id, _scheduler| {
        let storage = storage.clone();
        Box::pin(async move {
            if let Err(e) = sweep(&storage, Utc::now().timestamp()).await {
                error!(error = %e, "Maintenance sweep failed");
            }
        })
    })?;
    Ok(job)
}

/// Ближайшая пятница 18:00 по `tz`, строго позже `after`. Для логов и /status.
pub fn next_weekly_run(after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let local = after.with_timezone(&tz);
    let days_ahead = (7 + DIGEST_WEEKDAY.num_days_from_monday() as i64
        - local.weekday().num_days_from_monday() as i64)
        % 7;
    let first = local.date_naive() + TimeDelta::days(days_ahead);
    (0..3)
        .map(|week| first + TimeDelta::weeks(week))
        .filter_map(|date| {
            let naive = date.and_time(NaiveTime::MIN) + TimeDelta::hours(DIGEST_HOUR);
            tz.from_local_datetime(&naive).earliest()
        })
        .map(|run| run.with_timezone(&Utc))
        .find(|run| *run > after)
}

pub fn schedule_label(tz: Tz) -> String {
    format!("пятница {DIGEST_HOUR}:00 ({tz})")
}

/// Куда слать авто-подборку. Без привязки — никуда.
pub fn auto_destination(settings: &Settings) -> Option<(ChatId, Option<ThreadId>)> {
    settings.target_chat_id.map(|chat| {
        (ChatId(chat), settings.target_thread_id.map(|t| ThreadId(MessageId(t))))
    })
}

/// Недоступность TMDB и пустая подборка — не ошибки: пропускаем цикл молча.
/// Коммит истории только после успешной отправки.
pub async fn send_auto_digest(
    bot: &Bot,
    tmdb: &TmdbClient,
    storage: &Storage,
    now: i64,
) -> anyhow::Result<()> {
    let settings = storage.settings().await;
    if !settings.enabled {
        info!("Auto mode disabled, skipping digest");
        return Ok(());
    }
    let Some((chat, thread)) = auto_destination(&settings) else {
        info!("No binding set, auto digest not sent");
        return Ok(());
    };

    let selection = match build_digest(tmdb, storage, now).await {
        Ok(s) => s,
        Err(e) => {
            error!(status = ?e.status, error = %e, "TMDB API unavailable, skipping auto digest");
            return Ok(());
        }
    };
    if selection.is_empty() {
        warn!("No content available for auto digest");
        return Ok(());
    }

    let req = bot
        .send_message(chat, format_digest_html(&selection))
        .parse_mode(ParseMode::Html);
    let req = match thread {
        Some(t) => req.message_thread_id(t),
        None => req,
    };
    req.await.context("failed to deliver auto digest")?;

    selection.commit(storage, now).await?;
    info!(
        chat_id = chat.0,
        thread_id = ?settings.target_thread_id,
        movies = selection.movies.len(),
        series = selection.series.len(),
        "Auto digest sent to bound topic"
    );
    Ok(())
}

/// Чистит историю отправок старше 30 дней и rate limit старше часа.
pub async fn sweep(storage: &Storage, now: i64) -> anyhow::Result<(usize, usize)> {
    let sent = storage.purge_older_than(now - DEDUP_WINDOW_SECS).await?;
    let limits = storage
        .purge_rate_limit_older_than(now - RATE_LIMIT_RETENTION_SECS)
        .await?;
    info!(sent_items = sent, rate_limits = limits, "Cleanup tasks done");
    Ok((sent, limits))
}
