//! Moderation topics produced transiently by the topic guard.

use serde::{Deserialize, Serialize};

/// The closed set of subjects a user message can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Topic {
    Sport,
    Religion,
    Politics,
    Other,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Sport, Topic::Religion, Topic::Politics, Topic::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Sport => "SPORT",
            Topic::Religion => "RELIGION",
            Topic::Politics => "POLITICS",
            Topic::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown topic: {s}"))
    }
}
