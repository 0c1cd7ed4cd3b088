use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BREAK_TAGS: Regex = Regex::new(r"(?i)<br\s*/?>|</p\s*>|</li\s*>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref BLANK_RUNS: Regex = Regex::new(r"[ \t]+").unwrap();
}

/// Catalog descriptions arrive as HTML fragments. Keep paragraph breaks,
/// drop the rest of the markup and decode entities.
pub fn clean_description(html: &str) -> String {
    let text = BREAK_TAGS.replace_all(html, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = html_escape::decode_html_entities(&text);

    text.lines()
        .map(|line| BLANK_RUNS.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Shorten to `max` characters on a char boundary, adding an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}
