//! Turning inbound text into download requests.
//!
//! Only public post links (`https://t.me/<sender>/<post>`) are understood.
//! The destination key is `<sender>_<post>`, so every file of one post lands
//! in the same directory.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identity of one linked post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub post_sender: String,
    pub post_id: String,
    /// The cleaned link itself, used as the source locator.
    pub url: String,
}

impl LinkInfo {
    pub fn destination_key(&self) -> String {
        format!("{}_{}", self.post_sender, self.post_id)
    }
}

fn post_regex() -> &'static Regex {
    static POST: OnceLock<Regex> = OnceLock::new();
    POST.get_or_init(|| Regex::new(r"^https://t\.me/([^/\s]+)/(\d+)(?:\S*)?").unwrap())
}

fn candidate_regex() -> &'static Regex {
    static CANDIDATE: OnceLock<Regex> = OnceLock::new();
    CANDIDATE.get_or_init(|| Regex::new(r"https://t\.me/\S+").unwrap())
}

/// Parse a single link. Trailing sentence punctuation is ignored.
pub fn parse_link(text: &str) -> Option<LinkInfo> {
    let url = text.trim().trim_end_matches(['.', ',', ';', '!', '?']);
    let caps = post_regex().captures(url)?;

    Some(LinkInfo {
        post_sender: caps.get(1)?.as_str().to_string(),
        post_id: caps.get(2)?.as_str().to_string(),
        url: url.to_string(),
    })
}

/// Every parsable post link in free text, in order of appearance.
pub fn extract_links(text: &str) -> Vec<LinkInfo> {
    candidate_regex()
        .find_iter(text)
        .filter_map(|m| parse_link(m.as_str()))
        .collect()
}
