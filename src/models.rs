use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Format SQLite uses for `CURRENT_TIMESTAMP`.
pub const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Insane,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown difficulty: {0}")]
pub struct ParseDifficultyError(pub String);

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Insane => "insane",
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "insane" => Ok(Self::Insane),
            _ => Err(ParseDifficultyError(s.to_string())),
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: Option<NaiveDateTime>,
}

/// Per-user score state. `seen_challenges` keeps the order in which
/// challenges were served and never holds duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub user_id: i64,
    pub total_score: i64,
    pub completed_count: i64,
    pub seen_challenges: Vec<i64>,
}

impl Progress {
    /// Appends `challenge_id` to the seen list.
    ///
    /// Returns `true` if it was newly added, false otherwise.
    pub fn mark_seen(&mut self, challenge_id: i64) -> bool {
        if self.seen_challenges.contains(&challenge_id) {
            return false;
        }
        self.seen_challenges.push(challenge_id);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub id: i64,
    pub cwe_id: String,
    pub cwe_name: Option<String>,
    pub cve_id: Option<String>,
    pub difficulty: Difficulty,
    pub title: Option<String>,
    pub vulnerable_code: String,
    pub fixed_code: Option<String>,
    pub description: Option<String>,
    pub vulnerability: Option<String>,
    pub impact: Option<String>,
    pub hint: Option<String>,
    pub solution: Option<String>,
    pub commit_hash: Option<String>,
    pub git_url: Option<String>,
}

/// A challenge row that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChallenge {
    pub cwe_id: String,
    pub cwe_name: String,
    pub cve_id: Option<String>,
    pub difficulty: Difficulty,
    pub title: String,
    pub vulnerable_code: String,
    pub fixed_code: String,
    pub description: String,
    pub vulnerability: String,
    pub impact: String,
    pub hint: String,
    pub solution: String,
    pub commit_hash: String,
    pub git_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub total_score: i64,
    pub completed_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CweOption {
    pub cwe_id: String,
    pub cwe_name: Option<String>,
}
