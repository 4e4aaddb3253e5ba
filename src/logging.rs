use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing_subscriber::EnvFilter;

static BEARER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").expect("bearer token regex should compile")
});

/// RUST_LOG имеет приоритет над уровнем из конфига.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},reqwest=warn,hyper=warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Прячет bearer-токены перед тем, как текст попадёт в лог.
pub fn mask_sensitive(text: &str) -> Cow<'_, str> {
    BEARER_TOKEN.replace_all(text, "Bearer ***")
}
