//! Keyword selection pipeline.
//!
//! One run goes: active blacklist, cache or live fetch per seed, cache write,
//! filters, similarity and score, repetition penalty, diversity check,
//! selection, persistence, blacklisting, JSON output. The store connection is
//! opened at the start of [`Pipeline::run`] and closed on every exit path.

pub mod filter;
pub mod output;
pub mod scoring;
pub mod selection;

use database::KeywordStore;
use embedding_engine::{DiversityFilter, EmbeddingEngine, Verdict};
use keyharvest_core::{
    normalize_term, CoreError, KeywordRecord, PipelineConfig, SeedKeyword, SelectionStrategy,
};
use keyword_client::{KeywordSource, SeedFetcher};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Stage at which a run ran out of candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyStage {
    NoSeeds,
    NoCandidates,
    Filtering,
    Diversity,
}

impl fmt::Display for EmptyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            EmptyStage::NoSeeds => "no seed keywords configured",
            EmptyStage::NoCandidates => "no candidates fetched",
            EmptyStage::Filtering => "no candidates survived filtering",
            EmptyStage::Diversity => "no candidates survived the diversity check",
        };
        f.write_str(description)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub seeds: usize,
    pub fetched: usize,
    pub from_cache: usize,
    pub filtered: usize,
    pub accepted: usize,
    pub selected: Vec<KeywordRecord>,
    pub persisted: u64,
    pub blacklisted: u64,
    pub failed_seeds: Vec<String>,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Nothing to select; nothing was persisted.
    Empty {
        stage: EmptyStage,
        report: RunReport,
    },
}

impl RunOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            RunOutcome::Completed(report) | RunOutcome::Empty { report, .. } => report,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RunOutcome::Empty { .. })
    }
}

/// Long-lived collaborators shared by every run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub engine: EmbeddingEngine,
    pub database_url: String,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig, engine: EmbeddingEngine, database_url: impl Into<String>) -> Self {
        Self {
            config,
            engine,
            database_url: database_url.into(),
        }
    }
}

/// Trim, lowercase and drop repeated seeds; the first category wins.
pub fn normalize_seeds(seeds: Vec<SeedKeyword>) -> Vec<SeedKeyword> {
    let mut seen = HashSet::new();
    seeds
        .into_iter()
        .filter_map(|seed| {
            let text = normalize_term(&seed.text);
            if text.is_empty() || !seen.insert(text.clone()) {
                return None;
            }
            let category = seed.category.trim().to_string();
            Some(SeedKeyword::new(text, category))
        })
        .collect()
}

pub struct Pipeline<S> {
    context: PipelineContext,
    fetcher: SeedFetcher<S>,
}

impl<S: KeywordSource> Pipeline<S> {
    pub fn new(context: PipelineContext, fetcher: SeedFetcher<S>) -> Self {
        Self { context, fetcher }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn fetcher(&self) -> &SeedFetcher<S> {
        &self.fetcher
    }

    pub async fn run(&self) -> Result<RunOutcome, CoreError> {
        let store = KeywordStore::open(&self.context.database_url).await?;
        let result = self.execute(&store).await;
        store.close().await;

        match &result {
            Ok(RunOutcome::Completed(report)) => info!(
                "Run complete: {} selected, {} persisted, {} blacklisted",
                report.selected.len(),
                report.persisted,
                report.blacklisted
            ),
            Ok(RunOutcome::Empty { stage, .. }) => info!("Run ended early: {}", stage),
            Err(error) => warn!("Run aborted: {}", error),
        }
        result
    }

    async fn resolve_seeds(&self, store: &KeywordStore) -> Result<Vec<SeedKeyword>, CoreError> {
        let seeds = if self.context.config.seeds.is_empty() {
            store.fetch_seed_keywords().await?
        } else {
            self.context.config.seeds.clone()
        };
        Ok(normalize_seeds(seeds))
    }

    async fn execute(&self, store: &KeywordStore) -> Result<RunOutcome, CoreError> {
        let config = &self.context.config;
        let engine = &self.context.engine;
        let mut report = RunReport::default();

        let seeds = self.resolve_seeds(store).await?;
        report.seeds = seeds.len();
        if seeds.is_empty() {
            return Ok(empty(EmptyStage::NoSeeds, report));
        }

        let blacklist = store
            .fetch_active_blacklist(config.store.blacklist_retention())
            .await?;
        info!("{} terms on the active blacklist", blacklist.len());

        // Cached rows are reused for seeds they were fetched for; other seeds go live.
        let seed_texts: HashSet<&str> = seeds.iter().map(|s| s.text.as_str()).collect();
        let cached: Vec<KeywordRecord> = store
            .fetch_unexpired_cache(config.store.cache_ttl())
            .await?
            .into_iter()
            .filter(|r| {
                r.seed_keyword
                    .as_deref()
                    .is_some_and(|seed| seed_texts.contains(seed))
            })
            .collect();
        let cached_seeds: HashSet<String> =
            cached.iter().filter_map(|r| r.seed_keyword.clone()).collect();
        let to_fetch: Vec<SeedKeyword> = seeds
            .iter()
            .filter(|s| !cached_seeds.contains(&s.text))
            .cloned()
            .collect();
        report.from_cache = cached.len();
        info!(
            "{} cached records cover {} seeds; {} seeds need a live fetch",
            cached.len(),
            cached_seeds.len(),
            to_fetch.len()
        );

        let mut live = Vec::new();
        if !to_fetch.is_empty() {
            let fetches = self.fetcher.fetch_all(&to_fetch).await?;
            for fetch in fetches {
                if fetch.is_failed() {
                    report.failed_seeds.push(fetch.seed.text.clone());
                }
                live.extend(fetch.records);
            }
            report.fetched = live.len();

            if !live.is_empty() {
                store.prune_expired_cache(config.store.cache_ttl()).await?;
                store.write_cache(&live).await?;
            }
        }

        let mut candidates = cached;
        candidates.extend(live);
        if candidates.is_empty() {
            return Ok(empty(EmptyStage::NoCandidates, report));
        }

        let filtered = filter::apply_filters(candidates, &config.filter, &blacklist);
        let mut kept = filtered.kept;
        report.filtered = kept.len();
        if kept.is_empty() {
            return Ok(empty(EmptyStage::Filtering, report));
        }

        let seed_texts: Vec<String> = seeds.iter().map(|s| s.text.clone()).collect();
        let kept_texts: Vec<String> = kept.iter().map(|r| r.text.clone()).collect();
        let embedded = engine.similarity_to_seeds(&seed_texts, &kept_texts).await?;

        scoring::apply_scores(&mut kept, &embedded.similarities, &config.scoring.weights);
        scoring::apply_repetition_penalty(&mut kept, config.scoring.repetition_penalty);
        let ranking = scoring::rank_unique(&kept);
        debug!("{} unique candidates after ranking", ranking.len());

        // Earlier selections are matched separately so reruns stay away from them.
        let mut prior_terms: Vec<String> = blacklist.iter().cloned().collect();
        prior_terms.sort();
        let prior_vectors = engine.embed_batch(&prior_terms).await?;

        let candidate_vectors = embedded.candidate_vectors;
        let mut diversity = DiversityFilter::new(
            config.scoring.generic_threshold,
            embedded.seed_vectors,
            prior_vectors,
        );
        let mut accepted = Vec::new();
        let mut accepted_vectors = Vec::new();
        for index in ranking {
            match diversity.admit(&candidate_vectors[index]) {
                Verdict::Accepted => {
                    accepted.push(kept[index].clone());
                    accepted_vectors.push(candidate_vectors[index].clone());
                }
                Verdict::TooGeneric(mean) => {
                    debug!("'{}' too generic (mean seed similarity {:.3})", kept[index].text, mean)
                }
                Verdict::PreviouslySelected(max) => {
                    debug!("'{}' too close to an earlier selection ({:.3})", kept[index].text, max)
                }
                Verdict::TooSimilar(mean) => {
                    debug!("'{}' too close to accepted terms ({:.3})", kept[index].text, mean)
                }
            }
        }
        report.accepted = diversity.admitted();
        info!("{} candidates passed the diversity check", report.accepted);
        if accepted.is_empty() {
            return Ok(empty(EmptyStage::Diversity, report));
        }

        let selected = match config.selection.strategy {
            SelectionStrategy::Cluster => {
                selection::select_by_cluster(&accepted, &accepted_vectors, &config.selection)
            }
            SelectionStrategy::CategoryBalanced => {
                selection::select_category_balanced(&accepted, &config.selection)
            }
        };
        log_selection(&selected);

        report.persisted = store
            .persist_selection(&selected, config.store.blacklist_retention())
            .await?;
        let terms: Vec<&str> = selected.iter().map(|r| r.text.as_str()).collect();
        report.blacklisted = store.blacklist(&terms).await?;

        output::write_output(&config.output.path, &selected).await?;
        report.output_path = Some(config.output.path.clone());
        report.selected = selected;

        Ok(RunOutcome::Completed(report))
    }
}

fn empty(stage: EmptyStage, report: RunReport) -> RunOutcome {
    info!("Stopping: {}", stage);
    RunOutcome::Empty { stage, report }
}

fn log_selection(selected: &[KeywordRecord]) {
    let mut by_category: HashMap<&str, usize> = HashMap::new();
    for record in selected {
        *by_category.entry(record.category.as_str()).or_insert(0) += 1;
        debug!(
            "Selected '{}' (score {:.3}, similarity {:.3}, category {})",
            record.text, record.score, record.similarity, record.category
        );
    }
    info!("Selected {} keywords: {:?}", selected.len(), by_category);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_seeds() {
        let seeds = normalize_seeds(vec![
            SeedKeyword::new(" Cloud Gaming ", "gaming"),
            SeedKeyword::new("cloud gaming", "lifestyle"),
            SeedKeyword::new("   ", "gaming"),
            SeedKeyword::new("AI Ethics", " ai_ethics "),
        ]);
        assert_eq!(
            seeds,
            vec![
                SeedKeyword::new("cloud gaming", "gaming"),
                SeedKeyword::new("ai ethics", "ai_ethics"),
            ]
        );
    }

    #[test]
    fn test_empty_stage_messages() {
        assert_eq!(EmptyStage::NoSeeds.to_string(), "no seed keywords configured");
        let outcome = empty(EmptyStage::Filtering, RunReport::default());
        assert!(outcome.is_empty());
        assert_eq!(outcome.report().selected.len(), 0);
    }
}
