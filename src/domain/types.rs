//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

/// Reader teams. The set is fixed; teams partition readers for the
/// leaderboard and are never stored as entities of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "team", rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
    Yellow,
}

impl Team {
    pub const ALL: [Team; 3] = [Team::Red, Team::Blue, Team::Yellow];

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
            Team::Yellow => "yellow",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Team::Red => "🔴",
            Team::Blue => "🔵",
            Team::Yellow => "🟡",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "post_status", rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

impl TryFrom<&str> for Team {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "red" => Ok(Team::Red),
            "blue" => Ok(Team::Blue),
            "yellow" => Ok(Team::Yellow),
            _ => Err(()),
        }
    }
}
