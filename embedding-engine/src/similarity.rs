/// Cosine similarity clamped to [0, 1].
///
/// Zero vectors and mismatched lengths compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Highest similarity between `vector` and any member of `set`, 0 for an empty set.
pub fn max_similarity(vector: &[f32], set: &[Vec<f32>]) -> f64 {
    set.iter()
        .map(|other| cosine_similarity(vector, other))
        .fold(0.0, f64::max)
}

/// Mean similarity between `vector` and the members of `set`, 0 for an empty set.
pub fn mean_similarity(vector: &[f32], set: &[Vec<f32>]) -> f64 {
    if set.is_empty() {
        return 0.0;
    }
    let total: f64 = set.iter().map(|other| cosine_similarity(vector, other)).sum();
    total / set.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted,
    /// Mean similarity to the seeds is above the threshold.
    TooGeneric(f64),
    /// Closest earlier selection is above the threshold.
    PreviouslySelected(f64),
    /// Mean similarity to what this run already accepted is above the threshold.
    TooSimilar(f64),
}

/// Rejects candidates that are too broad or too close to earlier picks.
///
/// Candidates must be offered best-first. `prior` holds terms selected by
/// earlier runs; they are matched by maximum similarity and never enter the
/// accepted set, whose mean only covers this run's admissions.
#[derive(Debug, Clone)]
pub struct DiversityFilter {
    threshold: f64,
    seeds: Vec<Vec<f32>>,
    prior: Vec<Vec<f32>>,
    accepted: Vec<Vec<f32>>,
}

impl DiversityFilter {
    pub fn new(threshold: f64, seeds: Vec<Vec<f32>>, prior: Vec<Vec<f32>>) -> Self {
        Self {
            threshold,
            seeds,
            prior,
            accepted: Vec::new(),
        }
    }

    pub fn check(&self, candidate: &[f32]) -> Verdict {
        let seed_mean = mean_similarity(candidate, &self.seeds);
        if seed_mean > self.threshold {
            return Verdict::TooGeneric(seed_mean);
        }
        let prior_max = max_similarity(candidate, &self.prior);
        if prior_max > self.threshold {
            return Verdict::PreviouslySelected(prior_max);
        }
        let accepted_mean = mean_similarity(candidate, &self.accepted);
        if accepted_mean > self.threshold {
            return Verdict::TooSimilar(accepted_mean);
        }
        Verdict::Accepted
    }

    /// Check and, when accepted, add the candidate to the accepted set.
    pub fn admit(&mut self, candidate: &[f32]) -> Verdict {
        let verdict = self.check(candidate);
        if verdict == Verdict::Accepted {
            self.accepted.push(candidate.to_vec());
        }
        verdict
    }

    /// Candidates admitted during this run.
    pub fn admitted(&self) -> usize {
        self.accepted.len()
    }
}
