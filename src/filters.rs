use crate::tmdb::ContentItem;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Языки, контент на которых в подборку не попадает.
static EXCLUDED_LANGUAGES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "hi", // хинди
        "ta", // тамильский
        "te", // телугу
        "ml", // малаялам
        "kn", // каннада
        "bn", // бенгальский
        "mr", // маратхи
        "pa", // панджаби
        "gu", // гуджарати
        "or", // ория
        "as", // ассамский
        "ur", // урду
        "sa", // санскрит
    ]
    .into_iter()
    .collect()
});

const EXCLUDED_COUNTRY: &str = "IN";

pub fn is_excluded(item: &ContentItem) -> bool {
    let lang = item.original_language.to_ascii_lowercase();
    EXCLUDED_LANGUAGES.contains(lang.as_str())
        || item.origin_countries.iter().any(|c| c == EXCLUDED_COUNTRY)
}

/// Порядок оставшихся сохраняется: это и есть рейтинг трендов.
pub fn filter_excluded(items: Vec<ContentItem>) -> Vec<ContentItem> {
    items.into_iter().filter(|item| !is_excluded(item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmdb::ContentKind::{Movie, Series};

    #[test]
    fn excluded_language_wins_regardless_of_country() {
        for lang in ["hi", "HI", "Ta", "ur"] {
            let item = ContentItem::sample(Movie, 1, lang, &["US"]);
            assert!(is_excluded(&item), "{lang} should be excluded");
        }
    }

    #[test]
    fn excluded_country_wins_regardless_of_language() {
        let item = ContentItem::sample(Series, 2, "en", &["GB", "IN"]);
        assert!(is_excluded(&item));
    }

    #[test]
    fn empty_countries_fall_back_to_language_check() {
        assert!(!is_excluded(&ContentItem::sample(Movie, 3, "ko", &[])));
        assert!(is_excluded(&ContentItem::sample(Movie, 4, "te", &[])));
    }

    #[test]
    fn filter_keeps_survivor_order() {
        let items = vec![
            ContentItem::sample(Movie, 1, "en", &["US"]),
            ContentItem::sample(Movie, 2, "hi", &["IN"]),
            ContentItem::sample(Movie, 3, "ja", &["JP"]),
            ContentItem::sample(Movie, 4, "fr", &["IN", "FR"]),
            ContentItem::sample(Movie, 5, "es", &[]),
        ];
        let ids: Vec<u64> = filter_excluded(items).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn filter_drops_nothing_without_matches() {
        let items = vec![
            ContentItem::sample(Series, 9, "en", &["US"]),
            ContentItem::sample(Series, 8, "de", &["DE"]),
        ];
        assert_eq!(filter_excluded(items.clone()), items);
    }
}
