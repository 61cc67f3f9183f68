use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to records whose seed carries none.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Normalized form used for blacklist and duplicate comparisons.
pub fn normalize_term(text: &str) -> String {
    text.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl CompetitionLevel {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => CompetitionLevel::Low,
            "medium" => CompetitionLevel::Medium,
            "high" => CompetitionLevel::High,
            _ => CompetitionLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionLevel::Low => "low",
            CompetitionLevel::Medium => "medium",
            CompetitionLevel::High => "high",
            CompetitionLevel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CompetitionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CompetitionLevel {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedKeyword {
    pub text: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl SeedKeyword {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }
}

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

/// A candidate keyword as it moves through the pipeline.
///
/// `similarity` and `score` stay at zero until the scorer fills them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub text: String,
    pub volume: u64,
    pub competition_level: CompetitionLevel,
    pub trend: f64,
    pub category: String,
    pub seed_keyword: Option<String>,
    pub similarity: f64,
    pub score: f64,
}

impl KeywordRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            volume: 0,
            competition_level: CompetitionLevel::Unknown,
            trend: 0.0,
            category: UNCATEGORIZED.to_string(),
            seed_keyword: None,
            similarity: 0.0,
            score: 0.0,
        }
    }

    pub fn normalized_text(&self) -> String {
        normalize_term(&self.text)
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Tag the record with the seed that produced it.
    pub fn tagged(mut self, seed: &SeedKeyword) -> Self {
        self.seed_keyword = Some(seed.text.clone());
        self.category = seed.category.clone();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub term: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted final selection, as read back by the article stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredKeyword {
    pub text: String,
    pub similarity: f64,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}
