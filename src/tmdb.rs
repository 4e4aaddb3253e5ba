use crate::logging::mask_sensitive;
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Источник недоступен: не-2xx ответ, сетевая ошибка или мусор вместо JSON.
/// Один тип на все случаи, чтобы вызывающий мог отличить его без разбора текста.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CatalogError {
    pub status: Option<u16>,
    message: String,
}

impl CatalogError {
    fn from_status(status: StatusCode) -> Self {
        Self {
            status: Some(status.as_u16()),
            message: format!("TMDB API error: {status}"),
        }
    }

    fn transport(e: reqwest::Error) -> Self {
        Self {
            status: None,
            message: format!("Failed to connect to TMDB API: {e}"),
        }
    }

    fn decode(e: reqwest::Error) -> Self {
        Self {
            status: None,
            message: format!("Malformed TMDB API response: {e}"),
        }
    }
}

#[derive(Clone)]
pub struct TmdbClient {
    auth: String,
    base_url: String,
    http: Client,
}

impl TmdbClient {
    /// `auth` — read-токен TMDB, с префиксом `Bearer ` или без.
    pub fn with_base_url(auth: impl Into<String>, base_url: impl Into<String>) -> Self {
        let auth: String = auth.into();
        let auth = auth.strip_prefix("Bearer ").unwrap_or(&auth).to_string();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { auth, base_url, http: Client::new() }
    }

    /// Тренды недели. Ретраев нет: что делать с ошибкой, решает вызывающий.
    pub async fn trending(&self, kind: ContentKind, page: u32) -> Result<Vec<ContentItem>, CatalogError> {
        let page = page.max(1);
        let items = match kind {
            ContentKind::Movie => {
                let data: TrendingResp<MovieDto> = self
                    .get(&format!("/trending/movie/week?language=en-US&page={page}"))
                    .await?;
                data.results.into_iter().map(ContentItem::from).collect()
            }
            ContentKind::Series => {
                let data: TrendingResp<SeriesDto> = self
                    .get(&format!("/trending/tv/week?language=en-US&page={page}"))
                    .await?;
                data.results.into_iter().map(ContentItem::from).collect()
            }
        };
        Ok(items)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, CatalogError> {
        debug!(endpoint, "TMDB API request");
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.auth)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(CatalogError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %mask_sensitive(&body), "TMDB API returned an error");
            return Err(CatalogError::from_status(status));
        }
        resp.json::<T>().await.map_err(CatalogError::decode)
    }
}

/* ======= Модель ======= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Series,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Movie => f.write_str("movie"),
            ContentKind::Series => f.write_str("series"),
        }
    }
}

/// Фильм или сериал из трендов, приведённый к общему виду.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub kind: ContentKind,
    pub id: u64,
    pub display_name: String,
    pub original_language: String,
    pub origin_countries: Vec<String>,
}

impl ContentItem {
    /// Ключ в истории отправок — id строкой (без учёта вида).
    pub fn dedup_key(&self) -> String {
        self.id.to_string()
    }
}

impl From<MovieDto> for ContentItem {
    fn from(m: MovieDto) -> Self {
        Self {
            kind: ContentKind::Movie,
            id: m.id,
            display_name: m.title,
            original_language: m.original_language,
            origin_countries: m.origin_country.unwrap_or_default(),
        }
    }
}

impl From<SeriesDto> for ContentItem {
    fn from(s: SeriesDto) -> Self {
        Self {
            kind: ContentKind::Series,
            id: s.id,
            display_name: s.name,
            original_language: s.original_language,
            origin_countries: s.origin_country.unwrap_or_default(),
        }
    }
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct TrendingResp<T> {
    results: Vec<T>,
}

#[derive(Deserialize, Debug)]
struct MovieDto {
    id: u64,
    title: String,
    original_language: String,
    #[serde(default)]
    origin_country: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
struct SeriesDto {
    id: u64,
    name: String,
    original_language: String,
    #[serde(default)]
    origin_country: Option<Vec<String>>,
}

#[cfg(test)]
impl ContentItem {
    pub(crate) fn sample(kind: ContentKind, id: u64, lang: &str, countries: &[&str]) -> Self {
        Self {
            kind,
            id,
            display_name: format!("{kind} {id}"),
            original_language: lang.to_string(),
            origin_countries: countries.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_trending_movies_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trending/movie/week"))
            .and(query_param("page", "1"))
            .and(query_param("language", "en-US"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "results": [
                    { "id": 10, "title": "Dune", "original_language": "en", "origin_country": ["US"] },
                    { "id": 11, "title": "Amélie", "original_language": "fr" }
                ],
                "total_pages": 1,
                "total_results": 2
            })))
            .mount(&server)
            .await;

        let client = TmdbClient::with_base_url("Bearer secret", server.uri());
        let items = client.trending(ContentKind::Movie, 1).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, ContentKind::Movie);
        assert_eq!(items[0].display_name, "Dune");
        assert_eq!(items[0].origin_countries, vec!["US".to_string()]);
        assert_eq!(items[1].id, 11);
        assert!(items[1].origin_countries.is_empty());
    }

    #[tokio::test]
    async fn series_use_name_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trending/tv/week"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "results": [
                    { "id": 7, "name": "Severance", "original_language": "en", "origin_country": null }
                ],
                "total_pages": 1,
                "total_results": 1
            })))
            .mount(&server)
            .await;

        let client = TmdbClient::with_base_url("secret", format!("{}/", server.uri()));
        let items = client.trending(ContentKind::Series, 1).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ContentKind::Series);
        assert_eq!(items[0].display_name, "Severance");
        assert_eq!(items[0].dedup_key(), "7");
    }

    #[tokio::test]
    async fn non_success_status_is_catalog_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let client = TmdbClient::with_base_url("secret", server.uri());
        let err = client.trending(ContentKind::Movie, 1).await.unwrap_err();
        assert_eq!(err.status, Some(503));
    }

    #[tokio::test]
    async fn malformed_body_is_catalog_error_without_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = TmdbClient::with_base_url("secret", server.uri());
        let err = client.trending(ContentKind::Series, 1).await.unwrap_err();
        assert_eq!(err.status, None);
        assert!(err.to_string().starts_with("Malformed TMDB API response"), "{err}");
    }

    #[tokio::test]
    async fn unreachable_host_is_catalog_error() {
        let client = TmdbClient::with_base_url("secret", "http://127.0.0.1:1");
        let err = client.trending(ContentKind::Movie, 1).await.unwrap_err();
        assert_eq!(err.status, None);
        assert!(err.to_string().starts_with("Failed to connect"), "{err}");
    }
}
