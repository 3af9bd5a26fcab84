//! Persistent domain records: tracked mentions and captured performances.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::record::Record;

/// What kind of entity a [`Mention`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MentionType {
    Composer,
    Instrument,
    Performer,
}

impl std::fmt::Display for MentionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MentionType::Composer => "Composer",
            MentionType::Instrument => "Instrument",
            MentionType::Performer => "Performer",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MentionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "composer" | "composers" => Ok(MentionType::Composer),
            "instrument" | "instruments" => Ok(MentionType::Instrument),
            "performer" | "performers" => Ok(MentionType::Performer),
            other => Err(format!("unknown mention type: {other}")),
        }
    }
}

/// A named entity whose occurrences in user text are counted.
///
/// Identity is the name; matching against user text is case-insensitive.
/// The counter never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MentionType,
    #[serde(default)]
    pub count: u64,
}

impl Mention {
    pub fn new(name: impl Into<String>, kind: MentionType) -> Self {
        Self {
            name: name.into(),
            kind,
            count: 0,
        }
    }

    /// A copy with the counter bumped by one.
    pub fn increment(self) -> Self {
        Self {
            count: self.count.saturating_add(1),
            ..self
        }
    }

    /// Whether `text` mentions this entity (case-insensitive substring).
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        !self.name.is_empty() && text.to_lowercase().contains(&self.name.to_lowercase())
    }
}

impl Record for Mention {
    const KIND: &'static str = "mention";

    fn id(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn with_id(self, id: String) -> Self {
        Self { name: id, ..self }
    }
}

/// An upcoming performance the user told us about. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub work: String,
    pub composer: String,
    pub date: NaiveDate,
}

impl Performance {
    pub fn new(work: impl Into<String>, composer: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: None,
            work: work.into(),
            composer: composer.into(),
            date,
        }
    }
}

impl Record for Performance {
    const KIND: &'static str = "performance";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn with_id(self, id: String) -> Self {
        Self { id: Some(id), ..self }
    }
}
