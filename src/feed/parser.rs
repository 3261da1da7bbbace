use chrono::{DateTime, Utc};
use feed_rs::model;
use feed_rs::parser::{self, ParseFeedError};
use sha2::{Digest, Sha256};

/// The parts of a fetched RSS/Atom document the sync engine consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteDocument {
    pub title: String,
    pub description: String,
    /// Canonical site link
    pub link: String,
    pub updated: Option<DateTime<Utc>>,
    /// Publisher's refresh hint in minutes (RSS `<ttl>`)
    pub ttl: Option<u32>,
    pub items: Vec<RemoteItem>,
}

/// One item of a fetched document. Never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteItem {
    /// `None` when the publisher supplied no identifier
    pub guid: Option<String>,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl RemoteItem {
    /// The item's GUID, synthesizing one from title and link when the
    /// publisher left it out or blank.
    ///
    /// The synthesized value is stored back on the item so later steps see
    /// the same GUID.
    pub fn resolve_guid(&mut self) -> &str {
        let own = self
            .guid
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_owned);

        let guid = own.unwrap_or_else(|| synthesize_guid(&self.title, &self.link));
        self.guid.insert(guid).as_str()
    }
}

/// Deterministic GUID for an item without one: hex SHA-256 of title + link.
pub fn synthesize_guid(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(link.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parse an RSS, Atom or JSON Feed body.
pub fn parse_document(bytes: &[u8]) -> Result<RemoteDocument, ParseFeedError> {
    // feed-rs invents ids for items that lack one; keep them empty so GUID
    // synthesis stays under our control.
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    let items = feed.entries.into_iter().map(remote_item).collect();

    Ok(RemoteDocument {
        title: text(feed.title),
        description: text(feed.description),
        link: feed
            .links
            .into_iter()
            .map(|l| l.href)
            .find(|href| !href.is_empty())
            .unwrap_or_default(),
        updated: feed.updated,
        ttl: feed.ttl,
        items,
    })
}

fn remote_item(entry: model::Entry) -> RemoteItem {
    let guid = Some(entry.id).filter(|id| !id.trim().is_empty());
    let link = entry
        .links
        .into_iter()
        .next()
        .map(|l| l.href)
        .unwrap_or_default();
    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .unwrap_or_default();
    let author = entry
        .authors
        .into_iter()
        .map(|p| p.name)
        .find(|name| !name.trim().is_empty());

    RemoteItem {
        guid,
        title: text(entry.title),
        link,
        description,
        author,
        published: entry.published,
        updated: entry.updated,
    }
}

fn text(t: Option<model::Text>) -> String {
    t.map(|t| t.content).unwrap_or_default()
}
