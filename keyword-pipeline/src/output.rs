use keyharvest_core::{CompetitionLevel, CoreError, KeywordRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One entry of the JSON artifact read by the article stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub text: String,
    pub similarity: f64,
    pub score: f64,
    pub volume: u64,
    pub competition_level: CompetitionLevel,
    pub trend: f64,
    pub category: String,
    pub seed_keyword: Option<String>,
}

impl From<&KeywordRecord> for OutputRecord {
    fn from(record: &KeywordRecord) -> Self {
        Self {
            text: record.text.clone(),
            similarity: record.similarity,
            score: record.score,
            volume: record.volume,
            competition_level: record.competition_level,
            trend: record.trend,
            category: record.category.clone(),
            seed_keyword: record.seed_keyword.clone(),
        }
    }
}

pub fn render(records: &[KeywordRecord]) -> Result<String, CoreError> {
    let entries: Vec<OutputRecord> = records.iter().map(OutputRecord::from).collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

/// Write the selection as a JSON array, creating parent directories.
pub async fn write_output(path: &Path, records: &[KeywordRecord]) -> Result<(), CoreError> {
    let json = render(records)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    info!("Wrote {} keywords to {}", records.len(), path.display());
    Ok(())
}
