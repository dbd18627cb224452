// src/tags.rs
//! Tag primitives: extraction, allow-list scoping, line filtering and
//! content segmentation for markdown rendering.
//!
//! Grammar: `#` followed by one or more segments of word characters or
//! hyphens separated by `/` (e.g. `#work/project-x`). Trailing underscores
//! are not part of a tag; they are treated as emphasis (`_#tag_`).
//!
//! All functions here are pure.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

fn tag_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"#([\w-]+(?:/[\w-]+)*)").unwrap())
}

/// A tag occurrence: `start` is the byte index of `#`, `end` the byte index
/// just past the tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TagSpan<'a> {
    start: usize,
    end: usize,
    value: &'a str,
}

fn tag_spans(text: &str) -> Vec<TagSpan<'_>> {
    let mut out = Vec::new();
    for caps in tag_regex().captures_iter(text) {
        let (Some(all), Some(m)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = m.as_str().trim_end_matches(['_', '/']);
        if value.is_empty() {
            continue;
        }
        out.push(TagSpan {
            start: all.start(),
            end: m.start() + value.len(),
            value,
        });
    }
    out
}

/// Lowercase and strip a leading `#`.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// `tag` equals `scope` or is a sub-path of it (`work/x` is in `work`).
pub fn in_scope(tag: &str, scope: &str) -> bool {
    tag == scope
        || (tag.len() > scope.len()
            && tag.starts_with(scope)
            && tag.as_bytes()[scope.len()] == b'/')
}

/// Whether a normalized tag is covered by any entry of the allow-list.
pub fn is_allowed<S: AsRef<str>>(tag: &str, allowed: &[S]) -> bool {
    allowed
        .iter()
        .any(|a| in_scope(tag, &normalize_tag(a.as_ref())))
}

/// Extract distinct lower-cased tags in order of first occurrence.
///
/// With `pattern`, only tags in that scope are returned (`Some("work")`
/// keeps `work` and `work/project-x`, drops `home`).
pub fn extract(text: &str, pattern: Option<&str>) -> Vec<String> {
    let scope = pattern.map(normalize_tag).filter(|s| !s.is_empty());
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for span in tag_spans(text) {
        let tag = span.value.to_lowercase();
        if let Some(scope) = scope.as_deref() {
            if !in_scope(&tag, scope) {
                continue;
            }
        }
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    out
}

/// Render tags back to text (`#a #b/c`).
pub fn as_text<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(|t| format!("#{}", t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep only lines containing at least one allowed tag.
pub fn filter_allowed_lines<S: AsRef<str>>(text: &str, allowed: &[S], separator: &str) -> String {
    text.lines()
        .filter(|line| {
            tag_spans(line)
                .iter()
                .any(|s| is_allowed(&s.value.to_lowercase(), allowed))
        })
        .collect::<Vec<_>>()
        .join(separator)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Segment {
    Text(String),
    Tag(String),
}

/// Split `text` into text and tag runs.
///
/// Allowed tags become `Segment::Tag` and swallow any `*`/`_` emphasis
/// wrappers touching them. Tags outside the allow-list stay in the
/// surrounding text verbatim.
pub fn segment<S: AsRef<str>>(text: &str, allowed: &[S]) -> Vec<Segment> {
    let bytes = text.as_bytes();
    let is_wrapper = |b: u8| b == b'*' || b == b'_';

    let mut out = Vec::new();
    let mut cursor = 0usize;
    for span in tag_spans(text) {
        if span.start < cursor {
            continue;
        }
        let tag = span.value.to_lowercase();
        if !is_allowed(&tag, allowed) {
            continue;
        }

        let mut lead = span.start;
        while lead > cursor && is_wrapper(bytes[lead - 1]) {
            lead -= 1;
        }
        let mut trail = span.end;
        while trail < bytes.len() && is_wrapper(bytes[trail]) {
            trail += 1;
        }

        if lead > cursor {
            out.push(Segment::Text(text[cursor..lead].to_string()));
        }
        out.push(Segment::Tag(tag));
        cursor = trail;
    }
    if cursor < text.len() {
        out.push(Segment::Text(text[cursor..].to_string()));
    }
    out
}

/// Regex for the document-search capability matching any allowed tag.
pub fn search_pattern<S: AsRef<str>>(allowed: &[S]) -> String {
    let alts = allowed
        .iter()
        .map(|a| normalize_tag(a.as_ref()))
        .filter(|a| !a.is_empty())
        .map(|a| regex::escape(&a))
        .collect::<Vec<_>>();
    if alts.is_empty() {
        return r"#[\w-]+".to_string();
    }
    format!(r"#(?:{})(?:/[\w-]+)*", alts.join("|"))
}

/// Stable cache key for a set of tags (order and case insensitive).
pub fn tag_set_key<S: AsRef<str>>(tags: &[S]) -> String {
    let mut norm = tags
        .iter()
        .map(|t| normalize_tag(t.as_ref()))
        .collect::<Vec<_>>();
    norm.sort();
    norm.dedup();

    let mut hasher = Sha256::new();
    hasher.update(norm.join("\n").as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_fold_and_dedupe() {
        assert_eq!(extract("#Work #work", None), vec!["work"]);
    }

    #[test]
    fn first_occurrence_order() {
        assert_eq!(
            extract("x #beta y #alpha #Beta #gamma/one", None),
            vec!["beta", "alpha", "gamma/one"]
        );
    }

    #[test]
    fn round_trip_through_text() {
        let tags = extract("#a #b/c-d #e_f #a", None);
        assert_eq!(extract(&as_text(&tags), None), tags);
    }

    #[test]
    fn scoped_extraction_keeps_sub_paths() {
        let text = "#work/project-x #home #work #workshop";
        assert_eq!(
            extract(text, Some("work")),
            vec!["work/project-x", "work"]
        );
        assert_eq!(extract(text, Some("#Home")), vec!["home"]);
    }

    #[test]
    fn trailing_underscore_is_emphasis() {
        assert_eq!(extract("_#focus_ and #a__", None), vec!["focus", "a"]);
    }

    #[test]
    fn headings_are_not_tags() {
        assert!(extract("# Heading\n## Sub", None).is_empty());
    }

    #[test]
    fn filters_lines_without_allowed_tags() {
        let text = "did stuff #work\nlunch #food\nnothing here\nmore #work/x";
        assert_eq!(
            filter_allowed_lines(text, &["work"], " | "),
            "did stuff #work | more #work/x"
        );
    }

    #[test]
    fn segment_absorbs_emphasis_around_allowed_tag() {
        let segs = segment("see **#Work** now", &["work"]);
        assert_eq!(
            segs,
            vec![
                Segment::Text("see ".into()),
                Segment::Tag("work".into()),
                Segment::Text(" now".into()),
            ]
        );
    }

    #[test]
    fn segment_keeps_disallowed_tag_as_text() {
        let segs = segment("a _#private_ b #work", &["work"]);
        assert_eq!(
            segs,
            vec![
                Segment::Text("a _#private_ b ".into()),
                Segment::Tag("work".into()),
            ]
        );
    }

    #[test]
    fn segment_plain_text_only() {
        assert_eq!(
            segment("no tags", &["work"]),
            vec![Segment::Text("no tags".into())]
        );
        assert!(segment("", &["work"]).is_empty());
    }

    #[test]
    fn search_pattern_matches_allowed() {
        let re = Regex::new(&search_pattern(&["work", "c++"])).unwrap();
        assert!(re.is_match("#work/x"));
        assert!(re.is_match("#c++"));
        assert!(!re.is_match("#home"));
    }

    #[test]
    fn tag_set_key_is_order_insensitive() {
        assert_eq!(tag_set_key(&["b", "#A"]), tag_set_key(&["a", "b", "a"]));
        assert_ne!(tag_set_key(&["a"]), tag_set_key(&["b"]));
    }
}
