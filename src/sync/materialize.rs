use crate::feed::RemoteItem;
use crate::storage::{Marker, NewEntry};
use crate::util::clean_text;

/// Turn a remote item into an unsaved entry for `feed_id`.
///
/// The item's GUID must already be resolved; an unresolved one becomes an
/// empty GUID, which the store rejects.
pub fn materialize(item: &RemoteItem, feed_id: i64) -> NewEntry {
    NewEntry {
        feed_id,
        guid: item.guid.clone().unwrap_or_default(),
        title: clean_text(&item.title).into_owned(),
        link: item.link.clone(),
        description: item.description.clone(),
        author: item.author.clone().unwrap_or_default(),
        mark: Marker::Unread,
        saved: false,
        published: item.published.or(item.updated),
    }
}
