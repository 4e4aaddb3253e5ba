use crate::digest::DigestSelection;
use crate::tmdb::ContentItem;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Только названия, списком; пустая секция получает заглушку.
pub fn format_digest_html(selection: &DigestSelection) -> String {
    let mut lines = Vec::new();
    push_section(&mut lines, "<b>🎬 Movies</b>", &selection.movies, "• (нет доступных фильмов)");
    lines.push(String::new());
    push_section(&mut lines, "<b>📺 Series</b>", &selection.series, "• (нет доступных сериалов)");
    lines.join("\n")
}

fn push_section(lines: &mut Vec<String>, header: &str, items: &[ContentItem], placeholder: &str) {
    lines.push(header.to_string());
    if items.is_empty() {
        lines.push(placeholder.to_string());
    }
    for item in items {
        lines.push(format!("• {}", html_escape(&item.display_name)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmdb::ContentKind::{Movie, Series};

    fn named(mut item: ContentItem, name: &str) -> ContentItem {
        item.display_name = name.to_string();
        item
    }

    #[test]
    fn renders_both_sections() {
        let selection = DigestSelection {
            movies: vec![
                named(ContentItem::sample(Movie, 1, "en", &[]), "Dune: Part Two"),
                named(ContentItem::sample(Movie, 2, "en", &[]), "Tom & Jerry"),
            ],
            series: vec![named(ContentItem::sample(Series, 3, "en", &[]), "The <Bear>")],
        };
        assert_eq!(
            format_digest_html(&selection),
            "<b>🎬 Movies</b>\n• Dune: Part Two\n• Tom &amp; Jerry\n\n<b>📺 Series</b>\n• The &lt;Bear&gt;"
        );
    }

    #[test]
    fn empty_section_gets_placeholder() {
        let selection = DigestSelection {
            movies: vec![],
            series: vec![named(ContentItem::sample(Series, 3, "en", &[]), "Shōgun")],
        };
        let html = format_digest_html(&selection);
        assert!(html.contains("• (нет доступных фильмов)"));
        assert!(html.ends_with("• Shōgun"));
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(html_escape(r#"It's "fine""#), "It&#39;s &quot;fine&quot;");
    }
}
