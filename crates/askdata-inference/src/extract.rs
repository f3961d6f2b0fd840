//! Recover a bare SQL statement from raw model output.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:[a-z]+)?[ \t]*\r?\n(.*?)```").expect("valid regex"));

static LEADING_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(generated sql query|here is your sql|here is the sql|query output|sql query|sql)\b\s*:?\s*")
        .expect("valid regex")
});

/// Decode literal `\n`, `\t` and `\"` sequences some models emit.
fn unescape(text: &str) -> String {
    if !text.contains("\\n") && !text.contains("\\t") {
        return text.to_string();
    }
    text.replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}

/// Extract the SQL statement from model output.
///
/// Handles fenced code blocks (with or without a language tag), a leading
/// header such as `SQL:`, and escaped whitespace. Returns an empty string
/// when nothing usable remains.
pub fn extract_sql(raw: &str) -> String {
    let text = unescape(raw.trim());

    let body = match FENCED_BLOCK.captures(&text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
        None => text
            .trim()
            .trim_start_matches("```")
            .trim_end_matches("```")
            .to_string(),
    };

    let body = LEADING_HEADER.replace(body.trim(), "");
    body.trim().to_string()
}
