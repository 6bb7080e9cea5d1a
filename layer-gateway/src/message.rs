//! Message history normalization.

use serde::Serialize;

/// A message as the backend hands it over.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMessage {
    pub id:        i32,
    /// Unix timestamp.
    pub date:      i64,
    pub text:      String,
    /// Marked peer id of the author. Unset for anonymous channel posts.
    pub sender_id: Option<i64>,
    pub views:     Option<i32>,
    pub forwards:  Option<i32>,
    pub reply_to:  Option<RawReply>,
    pub media:     Option<MediaKind>,
}

/// The reply header of a message.
#[derive(Clone, Debug, PartialEq)]
pub struct RawReply {
    pub message_id: i32,
    /// Forum topic / thread root, if the reply lives in one.
    pub top_id:     Option<i32>,
}

/// Structural tag of an attached media payload. The payload itself is never
/// fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Document,
    Geo,
    GeoLive,
    Venue,
    Contact,
    WebPage,
    Poll,
    Dice,
    Game,
    Invoice,
    Unsupported,
    /// Anything newer than this list, by constructor name.
    #[serde(untagged)]
    Other(String),
}

// ─── Normalized record ───────────────────────────────────────────────────────

/// One entry of `list-messages`.
///
/// Optional fields are omitted when absent upstream; zero views and no views
/// are different things.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id:        i32,
    pub date:      i64,
    pub text:      String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views:     Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwards:  Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to:  Option<ReplyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media:     Option<MediaDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub message_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_id:     Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
}

impl MessageRecord {
    /// Ordering key: `(date, id)` ascending.
    pub fn sort_key(&self) -> (i64, i32) {
        (self.date, self.id)
    }
}

pub fn normalize(raw: RawMessage) -> MessageRecord {
    MessageRecord {
        id:        raw.id,
        date:      raw.date,
        text:      raw.text,
        sender_id: raw.sender_id.map(|id| id.to_string()),
        views:     raw.views,
        forwards:  raw.forwards,
        reply_to:  raw.reply_to.map(|r| ReplyRef { message_id: r.message_id, top_id: r.top_id }),
        media:     raw.media.map(|kind| MediaDescriptor { kind }),
    }
}

/// Normalize a page of history into ascending order, keeping the newest
/// `limit` records.
pub fn normalize_history(raw: Vec<RawMessage>, limit: usize) -> Vec<MessageRecord> {
    let mut records: Vec<MessageRecord> = raw.into_iter().map(normalize).collect();
    records.sort_by_key(MessageRecord::sort_key);
    if records.len() > limit {
        records.drain(..records.len() - limit);
    }
    records
}
