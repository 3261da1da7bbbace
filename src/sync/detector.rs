use std::collections::HashSet;

use chrono::Utc;

use super::materialize::materialize;
use super::store::Store;
use super::SyncError;
use crate::feed::{FetchOutcome, Fetcher};
use crate::storage::{Feed, NewEntry, User};

/// Result of comparing a feed's remote document against what the user
/// already has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Unchanged,
    /// Entries not yet stored for the user, in document order
    Changed(Vec<NewEntry>),
}

/// Fetch `feed` and work out which of its items are new for `user`.
///
/// On `Changed` the feed's cached metadata and `last_updated` are refreshed
/// in memory; nothing is written to the store here.
pub async fn check_for_updates<S: Store>(
    store: &S,
    fetcher: &Fetcher,
    feed: &mut Feed,
    user: &User,
) -> Result<Detection, SyncError> {
    let (mut document, etag) = match fetcher.fetch(feed).await? {
        FetchOutcome::NotModified => return Ok(Detection::Unchanged),
        FetchOutcome::Fetched { document, etag, .. } => (document, etag),
    };

    if let (Some(remote), Some(last)) = (document.updated, feed.last_updated) {
        if remote <= last {
            tracing::debug!(feed_id = feed.id, %remote, %last, "Document not updated since last sync");
            return Ok(Detection::Unchanged);
        }
    }

    if document.items.is_empty() {
        return Ok(Detection::Unchanged);
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for item in &mut document.items {
        let guid = item.resolve_guid().to_owned();
        if !seen.insert(guid.clone()) {
            continue;
        }
        if store.entry_exists_by_guid(&guid, user).await? {
            continue;
        }
        entries.push(materialize(item, feed.id));
    }

    if !document.title.trim().is_empty() {
        feed.title = document.title;
    }
    feed.description = document.description;
    feed.source = document.link;
    if let Some(ttl) = document.ttl {
        feed.ttl = i64::from(ttl);
    }
    if let Some(etag) = etag {
        feed.etag = etag;
    }
    let now = Utc::now();
    feed.last_updated = Some(feed.last_updated.map_or(now, |prev| prev.max(now)));

    tracing::debug!(feed_id = feed.id, new_entries = entries.len(), "Feed changed");
    Ok(Detection::Changed(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::storage::{Database, NewFeed};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DUPLICATE_GUIDS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Dupes</title>
    <ttl>90</ttl>
    <item><guid>a</guid><title>First a</title></item>
    <item><guid>b</guid><title>Only b</title></item>
    <item><guid>a</guid><title>Second a</title></item>
</channel></rss>"#;

    const EMPTY_CHANNEL: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Nothing yet</title></channel></rss>"#;

    async fn serve(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("ETag", "\"etag-1\""),
            )
            .mount(&server)
            .await;
        server
    }

    async fn setup(url: String) -> (Database, User, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db.create_feed(user.id, &NewFeed::new(url)).await.unwrap();
        (db, user, feed)
    }

    fn fetcher() -> Fetcher {
        Fetcher::new(&SyncConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_guids_collapse_to_first() {
        let server = serve(DUPLICATE_GUIDS).await;
        let (db, user, mut feed) = setup(format!("{}/rss", server.uri())).await;

        let detection = check_for_updates(&db, &fetcher(), &mut feed, &user)
            .await
            .unwrap();

        let Detection::Changed(entries) = detection else {
            panic!("expected Changed");
        };
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["First a", "Only b"]);

        assert_eq!(feed.title, "Dupes");
        assert_eq!(feed.ttl, 90);
        assert_eq!(feed.etag, "\"etag-1\"");
        assert!(feed.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_zero_items_is_unchanged() {
        let server = serve(EMPTY_CHANNEL).await;
        let (db, user, mut feed) = setup(format!("{}/rss", server.uri())).await;

        let detection = check_for_updates(&db, &fetcher(), &mut feed, &user)
            .await
            .unwrap();
        assert_eq!(detection, Detection::Unchanged);
        assert_eq!(feed.last_updated, None);
        assert_eq!(feed.title, "");
    }

    #[tokio::test]
    async fn test_known_guids_are_skipped() {
        let server = serve(DUPLICATE_GUIDS).await;
        let (db, user, mut feed) = setup(format!("{}/rss", server.uri())).await;

        let Detection::Changed(entries) = check_for_updates(&db, &fetcher(), &mut feed, &user)
            .await
            .unwrap()
        else {
            panic!("expected Changed");
        };
        db.create_entries(&entries, feed.id, user.id).await.unwrap();

        let again = check_for_updates(&db, &fetcher(), &mut feed, &user)
            .await
            .unwrap();
        assert_eq!(again, Detection::Changed(Vec::new()));
    }

    #[tokio::test]
    async fn test_last_updated_never_regresses() {
        let server = serve(DUPLICATE_GUIDS).await;
        let (db, user, mut feed) = setup(format!("{}/rss", server.uri())).await;
        let future = Utc::now() + Duration::hours(1);
        feed.last_updated = Some(future);

        check_for_updates(&db, &fetcher(), &mut feed, &user)
            .await
            .unwrap();
        assert_eq!(feed.last_updated, Some(future));
    }
}
