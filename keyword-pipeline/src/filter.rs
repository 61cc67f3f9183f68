use keyharvest_core::{FilterConfig, KeywordRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rejection {
    Blacklisted,
    LowVolume,
    Competition,
    Trend,
    TooShort,
    CategoryFull,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rejection::Blacklisted => "blacklisted",
            Rejection::LowVolume => "low volume",
            Rejection::Competition => "competition",
            Rejection::Trend => "trend",
            Rejection::TooShort => "too short",
            Rejection::CategoryFull => "category full",
        };
        f.write_str(name)
    }
}

/// Per-record checks, in the order they are applied.
pub fn check(
    record: &KeywordRecord,
    config: &FilterConfig,
    blacklist: &HashSet<String>,
) -> Option<Rejection> {
    if blacklist.contains(&record.normalized_text()) {
        return Some(Rejection::Blacklisted);
    }
    if record.volume <= config.volume_threshold(&record.category) {
        return Some(Rejection::LowVolume);
    }
    if !config.allowed_competition.contains(&record.competition_level) {
        return Some(Rejection::Competition);
    }
    if record.trend < config.min_trend {
        return Some(Rejection::Trend);
    }
    if record.word_count() < config.min_words {
        return Some(Rejection::TooShort);
    }
    None
}

#[derive(Debug, Default)]
pub struct FilterReport {
    pub kept: Vec<KeywordRecord>,
    pub rejected: BTreeMap<Rejection, usize>,
}

impl FilterReport {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn category_distribution(&self) -> BTreeMap<String, usize> {
        let mut distribution = BTreeMap::new();
        for record in &self.kept {
            *distribution.entry(record.category.clone()).or_insert(0) += 1;
        }
        distribution
    }
}

/// Apply every filter, then cap survivors per category in arrival order.
pub fn apply_filters(
    records: Vec<KeywordRecord>,
    config: &FilterConfig,
    blacklist: &HashSet<String>,
) -> FilterReport {
    let total = records.len();
    let mut report = FilterReport::default();
    let mut per_category: HashMap<String, usize> = HashMap::new();

    for record in records {
        let rejection = check(&record, config, blacklist).or_else(|| {
            let count = per_category.entry(record.category.clone()).or_insert(0);
            if *count >= config.per_category_candidate_cap {
                Some(Rejection::CategoryFull)
            } else {
                *count += 1;
                None
            }
        });

        match rejection {
            Some(reason) => {
                debug!("Dropped '{}': {}", record.text, reason);
                *report.rejected.entry(reason).or_insert(0) += 1;
            }
            None => report.kept.push(record),
        }
    }

    info!(
        "Filtering kept {} of {} candidates; per category: {:?}",
        report.kept.len(),
        total,
        report.category_distribution()
    );
    if report.rejected_total() > 0 {
        info!(
            "Filtering rejected {}: {:?}",
            report.rejected_total(),
            report.rejected
        );
    }
    report
}
