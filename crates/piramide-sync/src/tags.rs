//! Hashtag extraction and the trending aggregate.
//!
//! Tags are `#` followed by Unicode letters, digits, `_` or `-`, case-folded
//! with the `#` stripped. Trending only looks at the posts in memory.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use piramide_types::models::Post;

fn tag_regex() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"#([\p{L}\p{N}_-]+)").expect("hashtag pattern is valid"))
}

pub fn extract_tags(text: &str) -> Vec<String> {
    tag_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Top `top_n` tags by occurrence count. Ties keep first-seen order.
pub fn trending(posts: &[Post], top_n: usize) -> Vec<(String, usize)> {
    trending_texts(posts.iter().map(|p| p.text.as_str()), top_n)
}

pub fn trending_texts<'a>(texts: impl IntoIterator<Item = &'a str>, top_n: usize) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for text in texts {
        for tag in extract_tags(text) {
            let count = counts.entry(tag.clone()).or_insert(0);
            if *count == 0 {
                order.push(tag);
            }
            *count += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|tag| {
            let n = counts.get(&tag).copied().unwrap_or(0);
            (tag, n)
        })
        .collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(top_n);
    ranked
}

/// A run of post text, for highlighting tags without markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// The full `#tag` as written.
    Tag(&'a str),
}

pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut pos = 0;

    for mat in tag_regex().find_iter(text) {
        if mat.start() > pos {
            out.push(Segment::Text(&text[pos..mat.start()]));
        }
        out.push(Segment::Tag(mat.as_str()));
        pos = mat.end();
    }
    if pos < text.len() {
        out.push(Segment::Text(&text[pos..]));
    }
    out
}
