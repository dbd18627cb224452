// src/feeds/rss.rs
//! RSS 2.0 / Atom parsing and the HTTP feed fetcher.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;

use crate::collection::CollectionRecord;
use crate::error::DashboardError;
use crate::feeds::{FeedFetcher, FeedItem, FeedResult};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    guid: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<TextNode>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}
#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<TextNode>,
    published: Option<String>,
    updated: Option<String>,
    id: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}
#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

/// Element whose attributes we ignore (`<guid isPermaLink="false">`,
/// `<title type="html">`).
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Decode entities, strip markup, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(&decoded, " ");

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| clean_text(&v)).filter(|v| !v.is_empty())
}

/// Parse feed XML. `Ok(None)` when the document parsed but carried neither a
/// title nor any items.
pub fn parse_feed(source_id: &str, xml: &str) -> Result<Option<FeedResult>> {
    let t0 = Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let parsed = match from_str::<Rss>(&xml_clean) {
        Ok(rss) => from_rss(source_id, rss),
        Err(rss_err) => {
            let atom: AtomFeed = from_str(&xml_clean)
                .map_err(|_| rss_err)
                .context("parsing feed xml")?;
            from_atom(source_id, atom)
        }
    };

    histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    if parsed.title.is_empty() && parsed.items.is_empty() {
        return Ok(None);
    }
    Ok(Some(parsed))
}

fn from_rss(source_id: &str, rss: Rss) -> FeedResult {
    let items = rss
        .channel
        .items
        .into_iter()
        .filter_map(|it| {
            let title = non_empty(it.title).unwrap_or_default();
            let link = it.link.map(|l| l.trim().to_string()).unwrap_or_default();
            if title.is_empty() && link.is_empty() {
                return None;
            }
            Some(FeedItem {
                title,
                link,
                description: non_empty(it.description),
                pub_date: non_empty(it.pub_date),
                author: non_empty(it.author),
                guid: non_empty(it.guid.map(|g| g.value)),
            })
        })
        .collect();

    FeedResult {
        source_id: source_id.to_string(),
        title: non_empty(rss.channel.title).unwrap_or_default(),
        items,
    }
}

fn from_atom(source_id: &str, feed: AtomFeed) -> FeedResult {
    let items = feed
        .entries
        .into_iter()
        .filter_map(|e| {
            let title = non_empty(e.title.map(|t| t.value)).unwrap_or_default();
            let link = e
                .links
                .iter()
                .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                .or_else(|| e.links.first())
                .map(|l| l.href.trim().to_string())
                .unwrap_or_default();
            if title.is_empty() && link.is_empty() {
                return None;
            }
            Some(FeedItem {
                title,
                link,
                description: non_empty(e.summary.map(|s| s.value)),
                pub_date: non_empty(e.published.or(e.updated)),
                author: e.authors.into_iter().find_map(|a| non_empty(a.name)),
                guid: non_empty(e.id),
            })
        })
        .collect();

    FeedResult {
        source_id: source_id.to_string(),
        title: non_empty(feed.title.map(|t| t.value)).unwrap_or_default(),
        items,
    }
}

// quick-xml only knows the five XML entities; feeds routinely use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// Fetches each record's URL over HTTP and parses it as a feed.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("feedboard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_feed(
        &self,
        record: &CollectionRecord,
    ) -> Result<Option<FeedResult>, DashboardError> {
        let fetch = async {
            let resp = self
                .client
                .get(&record.url)
                .send()
                .await
                .context("feed http get()")?;
            let resp = resp.error_for_status().context("feed http status")?;
            resp.text().await.context("feed http .text()")
        };
        let body = fetch
            .await
            .map_err(|e| DashboardError::fetch(&record.id, &e))?;

        let mut parsed =
            parse_feed(&record.id, &body).map_err(|e| DashboardError::parse(&record.id, &e))?;
        if let Some(feed) = parsed.as_mut() {
            if feed.title.is_empty() {
                feed.title = record.title.clone();
            }
        }
        Ok(parsed)
    }
}
