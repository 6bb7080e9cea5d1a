//! Dialog peers: the raw shapes a backend hands over, and their normalized,
//! classified view.

use serde::Serialize;

const UNNAMED: &str = "Unnamed";

// ─── Raw shapes ───────────────────────────────────────────────────────────────

/// A peer entity exactly as the backend knows it.
#[derive(Clone, Debug, PartialEq)]
pub enum RawEntity {
    Channel(RawChannel),
    Chat(RawChat),
    User(RawUser),
    /// Forbidden chats, empty users and anything else without a usable body.
    Other { tag: String },
}

/// A broadcast channel or a supergroup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawChannel {
    pub id:                 i64,
    pub title:              String,
    pub username:           Option<String>,
    pub megagroup:          bool,
    pub broadcast:          bool,
    pub creator:            bool,
    pub verified:           bool,
    pub restricted:         bool,
    pub scam:               bool,
    pub fake:               bool,
    pub participants_count: Option<i32>,
}

/// A legacy basic group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawChat {
    pub id:                 i64,
    pub title:              String,
    pub creator:            bool,
    pub participants_count: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawUser {
    pub id:         i64,
    pub first_name: Option<String>,
    pub last_name:  Option<String>,
    pub username:   Option<String>,
    pub phone:      Option<String>,
    pub bot:        bool,
    pub verified:   bool,
    pub restricted: bool,
    pub scam:       bool,
    pub fake:       bool,
}

impl RawEntity {
    /// Structural tag, as reported in `entityType`.
    pub fn tag(&self) -> &str {
        match self {
            Self::Channel(_)    => "Channel",
            Self::Chat(_)       => "Chat",
            Self::User(_)       => "User",
            Self::Other { tag } => tag,
        }
    }

    /// The marked peer id dialogs and payloads use for this entity.
    pub fn marked_id(&self) -> Option<i64> {
        match self {
            Self::Channel(c) => Some(marked_channel_id(c.id)),
            Self::Chat(c)    => Some(-c.id),
            Self::User(u)    => Some(u.id),
            Self::Other { .. } => None,
        }
    }

    /// The entity's own title, if it has one.
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Channel(c) => Some(c.title.as_str()),
            Self::Chat(c)    => Some(c.title.as_str()),
            _ => None,
        }
    }
}

/// Offset that keeps channel ids apart from basic group ids once negated.
pub const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// `-(1_000_000_000_000 + id)`
pub fn marked_channel_id(channel_id: i64) -> i64 {
    -(CHANNEL_ID_OFFSET + channel_id)
}

/// One conversation in the account's dialog list.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDialog {
    /// Marked peer id, stable across calls.
    pub id:     String,
    /// Dialog-level title, when the backend has one.
    pub title:  Option<String>,
    pub entity: Option<RawEntity>,
}

// ─── Classification ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Contact,
    Group,
    Channel,
    Bot,
}

/// Classify a raw entity. Total and deterministic; a missing entity is a
/// contact.
pub fn classify(entity: Option<&RawEntity>) -> DialogKind {
    match entity {
        Some(RawEntity::Channel(c)) if c.megagroup => DialogKind::Group,
        Some(RawEntity::Channel(_)) => DialogKind::Channel,
        Some(RawEntity::Chat(_)) => DialogKind::Group,
        Some(RawEntity::User(u)) if u.bot => DialogKind::Bot,
        Some(RawEntity::User(_)) => DialogKind::Contact,
        Some(RawEntity::Other { .. }) | None => DialogKind::Contact,
    }
}

/// Display title, never empty.
///
/// Users use "first last", then their username. Everything else uses the
/// dialog-level title, then the entity's own title.
pub fn display_title(dialog_title: Option<&str>, entity: Option<&RawEntity>) -> String {
    let title = match entity {
        Some(RawEntity::User(u)) => {
            let name = [u.first_name.as_deref(), u.last_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            non_empty(Some(name.as_str())).or_else(|| non_empty(u.username.as_deref()))
        }
        Some(RawEntity::Channel(c)) => non_empty(dialog_title).or_else(|| non_empty(Some(c.title.as_str()))),
        Some(RawEntity::Chat(c)) => non_empty(dialog_title).or_else(|| non_empty(Some(c.title.as_str()))),
        _ => non_empty(dialog_title),
    };
    title.unwrap_or_else(|| UNNAMED.to_string())
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

// ─── Normalized view ─────────────────────────────────────────────────────────

/// One entry of `list-dialogs`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogEntry {
    pub id:           String,
    pub title:        String,
    #[serde(rename = "type")]
    pub kind:         DialogKind,
    pub entity_type:  String,
    pub is_broadcast: bool,
    pub is_megagroup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username:     Option<String>,
    /// Only reported for channels and groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_creator:   Option<bool>,
}

impl DialogEntry {
    pub fn from_raw(dialog: &RawDialog) -> Self {
        let entity = dialog.entity.as_ref();
        let (is_broadcast, is_megagroup) = match entity {
            Some(RawEntity::Channel(c)) => (c.broadcast, c.megagroup),
            _ => (false, false),
        };
        let username = match entity {
            Some(RawEntity::Channel(c)) => c.username.clone(),
            Some(RawEntity::User(u))    => u.username.clone(),
            _ => None,
        };
        let is_creator = match entity {
            Some(RawEntity::Channel(c)) => Some(c.creator),
            Some(RawEntity::Chat(c))    => Some(c.creator),
            _ => None,
        };
        Self {
            id:          dialog.id.clone(),
            title:       display_title(dialog.title.as_deref(), entity),
            kind:        classify(entity),
            entity_type: entity.map(RawEntity::tag).unwrap_or("Unknown").to_string(),
            is_broadcast,
            is_megagroup,
            username,
            is_creator,
        }
    }
}

/// The extended record returned by `get-entity-details`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDetails {
    pub id:    String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind:  DialogKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username:           Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone:              Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_creator:         Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_verified:        Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_restricted:      Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fake:            Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_scam:            Option<bool>,
}

impl EntityDetails {
    pub fn from_raw(dialog: &RawDialog) -> Self {
        let entity = dialog.entity.as_ref();
        let mut details = Self {
            id:                 dialog.id.clone(),
            title:              display_title(dialog.title.as_deref(), entity),
            kind:               classify(entity),
            username:           None,
            phone:              None,
            participants_count: None,
            is_creator:         None,
            is_verified:        None,
            is_restricted:      None,
            is_fake:            None,
            is_scam:            None,
        };
        match entity {
            Some(RawEntity::Channel(c)) => {
                details.username           = c.username.clone();
                details.participants_count = c.participants_count;
                details.is_creator         = Some(c.creator);
                details.is_verified        = Some(c.verified);
                details.is_restricted      = Some(c.restricted);
                details.is_fake            = Some(c.fake);
                details.is_scam            = Some(c.scam);
            }
            Some(RawEntity::Chat(c)) => {
                details.participants_count = c.participants_count;
                details.is_creator         = Some(c.creator);
            }
            Some(RawEntity::User(u)) => {
                details.username      = u.username.clone();
                details.phone         = u.phone.clone();
                details.is_verified   = Some(u.verified);
                details.is_restricted = Some(u.restricted);
                details.is_fake       = Some(u.fake);
                details.is_scam       = Some(u.scam);
            }
            Some(RawEntity::Other { .. }) | None => {}
        }
        details
    }
}
