use crate::filters::filter_excluded;
use crate::storage::Storage;
use crate::tmdb::{CatalogError, ContentItem, ContentKind, TmdbClient};
use tracing::{debug, error, info};

/// Сколько фильмов и сколько сериалов попадает в подборку.
pub const PER_KIND_LIMIT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSelection {
    pub movies: Vec<ContentItem>,
    pub series: Vec<ContentItem>,
}

impl DigestSelection {
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty() && self.series.is_empty()
    }

    /// Вызывать только после успешной доставки: помечает ровно то, что ушло в чат.
    pub async fn commit(&self, storage: &Storage, now: i64) -> anyhow::Result<usize> {
        storage
            .mark_sent(self.movies.iter().chain(self.series.iter()), now)
            .await
    }
}

/// Тренды недели → фильтр происхождения → дедуп → первые 3 каждого вида.
///
/// Оба запроса идут параллельно; если упал любой, подборки нет вовсе.
/// Пустая подборка — не ошибка.
pub async fn build_digest(
    tmdb: &TmdbClient,
    storage: &Storage,
    now: i64,
) -> Result<DigestSelection, CatalogError> {
    info!("Fetching popular content for this week");
    let (movies, series) = tokio::try_join!(
        tmdb.trending(ContentKind::Movie, 1),
        tmdb.trending(ContentKind::Series, 1)
    )
    .inspect_err(|e| error!(status = ?e.status, error = %e, "TMDB API error"))?;

    let movies = filter_excluded(movies);
    let series = filter_excluded(series);
    debug!(movies = movies.len(), series = series.len(), "After origin filter");

    let movies = drop_already_sent(movies, storage, now).await;
    let series = drop_already_sent(series, storage, now).await;
    debug!(movies = movies.len(), series = series.len(), "After dedup");

    let selection = DigestSelection {
        movies: movies.into_iter().take(PER_KIND_LIMIT).collect(),
        series: series.into_iter().take(PER_KIND_LIMIT).collect(),
    };
    info!(
        movies = selection.movies.len(),
        series = selection.series.len(),
        "Digest selected"
    );
    Ok(selection)
}

async fn drop_already_sent(items: Vec<ContentItem>, storage: &Storage, now: i64) -> Vec<ContentItem> {
    let mut fresh = Vec::with_capacity(items.len());
    for item in items {
        if !storage.has_been_sent(&item.dedup_key(), now).await {
            fresh.push(item);
        }
    }
    fresh
}
