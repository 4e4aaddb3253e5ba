use crate::tmdb::{ContentItem, ContentKind};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Окно дедупликации: 30 дней.
pub const DEDUP_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;
/// Одна команда на (чат, пользователь, действие) раз в 30 секунд.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 30;
pub const RATE_LIMIT_RETENTION_SECS: i64 = 60 * 60;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRecord {
    pub item_id: String,
    pub kind: ContentKind,
    pub sent_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    pub target_chat_id: Option<i64>,
    pub target_thread_id: Option<i32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { enabled: true, target_chat_id: None, target_thread_id: None }
    }
}

impl Settings {
    /// Без привязки отвечаем везде, с привязкой — только в своей теме.
    pub fn accepts(&self, chat_id: i64, thread_id: Option<i32>) -> bool {
        match self.target_chat_id {
            None => true,
            Some(target) => target == chat_id && self.target_thread_id == thread_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FileState {
    version: u32,
    #[serde(default)]
    settings: Settings,
    // item_id -> запись об отправке
    #[serde(default)]
    sent_items: HashMap<String, SentRecord>,
    // "chat:user:action" -> когда последний раз пользовались
    #[serde(default)]
    rate_limit: HashMap<String, i64>,
}

impl FileState {
    fn fresh() -> Self {
        Self { version: STATE_VERSION, ..Default::default() }
    }
}

#[derive(Clone)]
pub struct Storage {
    inner: Arc<RwLock<FileState>>,
    flush_lock: Arc<Mutex<()>>,
    path: PathBuf,
}

impl Storage {
    pub async fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !fs::try_exists(dir).await.unwrap_or(false) {
                fs::create_dir_all(dir).await?;
                info!(dir = %dir.display(), "Created state directory");
            }
        }

        let state = if fs::try_exists(&path).await.unwrap_or(false) {
            let data = fs::read(&path).await?;
            match serde_json::from_slice::<FileState>(&data) {
                Ok(mut s) => {
                    if s.version == 0 {
                        s.version = STATE_VERSION;
                    }
                    s
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "State file is unreadable, starting fresh");
                    FileState::fresh()
                }
            }
        } else {
            FileState::fresh()
        };
        info!(path = %path.display(), sent_items = state.sent_items.len(), "State loaded");

        Ok(Self {
            inner: Arc::new(RwLock::new(state)),
            flush_lock: Arc::new(Mutex::new(())),
            path,
        })
    }

    /* ====== История отправок ====== */

    /// Запись старше окна считается неотправленной, даже если её ещё не вычистили.
    pub async fn has_been_sent(&self, item_id: &str, now: i64) -> bool {
        let guard = self.inner.read().await;
        guard
            .sent_items
            .get(item_id)
            .is_some_and(|r| r.sent_at > now - DEDUP_WINDOW_SECS)
    }

    /// Insert-if-absent: живая запись сохраняет первое время отправки.
    /// Возвращает число новых записей.
    pub async fn mark_sent<'a>(
        &self,
        items: impl IntoIterator<Item = &'a ContentItem>,
        now: i64,
    ) -> anyhow::Result<usize> {
        let mut inserted = 0;
        {
            let mut guard = self.inner.write().await;
            for item in items {
                let key = item.dedup_key();
                let live = guard
                    .sent_items
                    .get(&key)
                    .is_some_and(|r| r.sent_at > now - DEDUP_WINDOW_SECS);
                if live {
                    continue;
                }
                guard.sent_items.insert(
                    key.clone(),
                    SentRecord { item_id: key, kind: item.kind, sent_at: now },
                );
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.flush().await?;
        }
        Ok(inserted)
    }

    /// Удаляет записи с `sent_at <= cutoff`.
    pub async fn purge_older_than(&self, cutoff: i64) -> anyhow::Result<usize> {
        let removed = {
            let mut guard = self.inner.write().await;
            let before = guard.sent_items.len();
            guard.sent_items.retain(|_, r| r.sent_at > cutoff);
            before - guard.sent_items.len()
        };
        if removed > 0 {
            self.flush().await?;
        }
        debug!(removed, "Purged old sent items");
        Ok(removed)
    }

    pub async fn sent_count(&self, now: i64) -> usize {
        let guard = self.inner.read().await;
        guard
            .sent_items
            .values()
            .filter(|r| r.sent_at > now - DEDUP_WINDOW_SECS)
            .count()
    }

    /* ====== Настройки ====== */

    pub async fn settings(&self) -> Settings {
        self.inner.read().await.settings.clone()
    }

    pub async fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.inner.write().await.settings.enabled = enabled;
        self.flush().await
    }

    pub async fn set_binding(&self, chat_id: i64, thread_id: Option<i32>) -> anyhow::Result<()> {
        {
            let mut guard = self.inner.write().await;
            guard.settings.target_chat_id = Some(chat_id);
            guard.settings.target_thread_id = thread_id;
        }
        self.flush().await
    }

    pub async fn clear_binding(&self) -> anyhow::Result<()> {
        {
            let mut guard = self.inner.write().await;
            guard.settings.target_chat_id = None;
            guard.settings.target_thread_id = None;
        }
        self.flush().await
    }

    /* ====== Rate limit ====== */

    /// true — можно выполнять (и отметка времени обновлена), false — рано.
    pub async fn try_acquire_rate_limit(&self, key: &str, now: i64) -> anyhow::Result<bool> {
        let allowed = {
            let mut guard = self.inner.write().await;
            match guard.rate_limit.get(key) {
                Some(&last) if last >= now - RATE_LIMIT_WINDOW_SECS => false,
                _ => {
                    guard.rate_limit.insert(key.to_string(), now);
                    true
                }
            }
        };
        if allowed {
            self.flush().await?;
        }
        Ok(allowed)
    }

    pub async fn purge_rate_limit_older_than(&self, cutoff: i64) -> anyhow::Result<usize> {
        let removed = {
            let mut guard = self.inner.write().await;
            let before = guard.rate_limit.len();
            guard.rate_limit.retain(|_, last| *last > cutoff);
            before - guard.rate_limit.len()
        };
        if removed > 0 {
            self.flush().await?;
        }
        debug!(removed, "Purged old rate limit entries");
        Ok(removed)
    }

    async fn flush(&self) -> anyhow::Result<()> {
        // один писатель за раз, иначе старый снапшот может перезаписать новый
        let _writer = self.flush_lock.lock().await;
        let snapshot = {
            let guard = self.inner.read().await;
            serde_json::to_vec_pretty(&*guard)?
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &snapshot).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

pub fn rate_limit_key(chat_id: i64, user_id: u64, action: &str) -> String {
    format!("{chat_id}:{user_id}:{action}")
}

#[cfg(test)]
pub(crate) fn temp_store_path(name: &str) -> PathBuf {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir()
        .join(format!("trending-digest-{}-{nanos}", std::process::id()))
        .join(format!("{name}.json"))
}
