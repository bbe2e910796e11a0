//! Magnet URI helpers.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static BTIH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[?&]xt=urn:btih:([0-9a-z]+)").expect("static btih pattern is valid")
});

/// Extract the BitTorrent info hash from a magnet URI (lowercased).
pub fn extract_info_hash(uri: &str) -> Option<String> {
    if !uri.trim_start().to_ascii_lowercase().starts_with("magnet:") {
        return None;
    }
    BTIH.captures(uri)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}
