use crate::collection::MelodyCollection;
use crate::error::Result;
use crate::model::config::{CompareConfig, Comparator};
use crate::model::melody::Melody;
use crate::ngram::{NGram, ShapeKey, get_ngrams, null_span_key};
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// How well one candidate melody matched the query.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub melody_id: String,
    /// Weighted fraction of query n-grams that found a partner, in `[0, 1]`.
    pub score: f64,
    pub exact_matches: usize,
    pub null_span_matches: usize,
    pub query_ngrams: usize,
}

/// Scores `candidate` n-grams against `query` n-grams.
///
/// Each candidate n-gram can be claimed by at most one query n-gram. Exact (pitch and
/// duration) matches are claimed first; with [`Comparator::NullSpanFallback`] the query
/// n-grams still unmatched may then claim a leftover candidate whose null span agrees.
pub fn score_ngrams(
    melody_id: &str,
    query: &[NGram],
    candidate: &[NGram],
    config: &CompareConfig,
) -> MatchScore {
    let mut available: HashMap<ShapeKey, usize> = HashMap::new();
    for ngram in candidate {
        *available.entry(ngram.shape_key()).or_default() += 1;
    }

    let mut exact_matches = 0;
    let mut unmatched: Vec<ShapeKey> = Vec::new();

    for ngram in query {
        let key = ngram.shape_key();
        match available.get_mut(&key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                exact_matches += 1;
            }
            _ => unmatched.push(key),
        }
    }

    let mut null_span_matches = 0;
    if config.comparator == Comparator::NullSpanFallback && !unmatched.is_empty() {
        let mut leftover: HashMap<ShapeKey, usize> = HashMap::new();
        for (key, count) in available.iter().filter(|(_, count)| **count > 0) {
            *leftover.entry(null_span_key(key)).or_default() += count;
        }

        for key in &unmatched {
            if let Some(count) = leftover.get_mut(&null_span_key(key))
                && *count > 0
            {
                *count -= 1;
                null_span_matches += 1;
            }
        }
    }

    let query_ngrams = query.len();
    let score = if query_ngrams == 0 {
        0.0
    } else {
        let weight = config.effective_null_span_weight();
        (exact_matches as f64 + weight * null_span_matches as f64) / query_ngrams as f64
    };

    MatchScore {
        melody_id: melody_id.to_string(),
        score,
        exact_matches,
        null_span_matches,
        query_ngrams,
    }
}

/// Compares two melodies directly.
pub fn compare_melodies(
    query: &Melody,
    candidate: &Melody,
    config: &CompareConfig,
) -> Result<MatchScore> {
    let query_ngrams = get_ngrams(query, config.ngram_size)?;
    let candidate_ngrams = get_ngrams(candidate, config.ngram_size)?;
    Ok(score_ngrams(
        candidate.id(),
        &query_ngrams,
        &candidate_ngrams,
        config,
    ))
}

/// Ranks every melody in `collection` by similarity to `query`.
///
/// Results are sorted by score, highest first, with ties broken by melody id. A query too
/// short to form a single n-gram yields an empty ranking, as does an empty collection.
/// The only error is an n-gram size of zero.
pub fn rank<C: MelodyCollection>(
    query: &Melody,
    collection: &C,
    config: &CompareConfig,
) -> Result<Vec<MatchScore>> {
    let query_ngrams = get_ngrams(query, config.ngram_size)?;
    if query_ngrams.is_empty() {
        debug!(
            "Query '{}' has {} notes, too few for {}-grams..!",
            query.id(),
            query.len(),
            config.ngram_size
        );
        return Ok(Vec::new());
    }

    let threshold = config.effective_threshold();
    let mut ranking: Vec<MatchScore> = Vec::with_capacity(collection.size());
    for candidate in collection.iter() {
        let candidate_ngrams = get_ngrams(candidate, config.ngram_size)?;
        let scored = score_ngrams(candidate.id(), &query_ngrams, &candidate_ngrams, config);

        if scored.score >= threshold {
            ranking.push(scored);
        }
    }

    ranking.sort_by(by_score_then_id);
    if let Some(max_results) = config.max_results {
        ranking.truncate(max_results);
    }

    debug!(
        "Ranked {} of {} melodies against '{}' ({} {}-grams)",
        ranking.len(),
        collection.size(),
        query.id(),
        query_ngrams.len(),
        config.ngram_size
    );

    Ok(ranking)
}

fn by_score_then_id(a: &MatchScore, b: &MatchScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.melody_id.cmp(&b.melody_id))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::InMemoryMelodyCollection;
    use crate::model::melody::MelodyBuilder;

    fn melody(id: &str, notes: &[(u8, f64, f64)]) -> Melody {
        notes
            .iter()
            .fold(MelodyBuilder::new(id), |builder, &(p, o, d)| {
                builder.note(p, o, d).unwrap()
            })
            .build()
    }

    fn line(id: &str, pitches: &[u8], offset: f64) -> Melody {
        let notes: Vec<(u8, f64, f64)> = pitches
            .iter()
            .enumerate()
            .map(|(i, &p)| (p, offset + i as f64, 1.0))
            .collect();
        melody(id, &notes)
    }

    fn collection(melodies: Vec<Melody>) -> InMemoryMelodyCollection {
        let mut collection = InMemoryMelodyCollection::new("test");
        for melody in melodies {
            collection.add(melody).unwrap();
        }
        collection
    }

    fn bigrams() -> CompareConfig {
        CompareConfig::default().with_ngram_size(2)
    }

    #[test]
    fn time_shifted_copy_scores_maximum() {
        env_logger::try_init().unwrap_or(());

        let a = line("A", &[60, 62, 64, 65], 0.0);
        // B starts ten quarters later; onsets differ but the shape does not
        let b = line("B", &[60, 62, 64, 65], 10.0);

        let scored = compare_melodies(&a, &b, &bigrams()).unwrap();
        assert_eq!(scored.score, 1.0);
        assert_eq!(scored.exact_matches, 3);
        assert_eq!(scored.query_ngrams, 3);
    }

    #[test]
    fn partial_overlap_is_fraction_matched() {
        env_logger::try_init().unwrap_or(());

        let query = line("q", &[60, 62, 64, 65], 0.0);
        let half = line("half", &[60, 62, 64, 69, 71], 0.0);

        let scored = compare_melodies(&query, &half, &bigrams()).unwrap();
        assert_eq!(scored.exact_matches, 2);
        assert!((scored.score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn candidate_ngrams_are_claimed_once() {
        env_logger::try_init().unwrap_or(());

        let query = line("q", &[60, 60, 60, 60], 0.0);
        let once = line("once", &[60, 60, 62], 0.0);

        let scored = compare_melodies(&query, &once, &bigrams()).unwrap();
        assert_eq!(scored.exact_matches, 1);
        assert!((scored.score - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn null_span_fallback_credits_rhythm() {
        env_logger::try_init().unwrap_or(());

        let query = line("q", &[60, 62, 64], 0.0);
        // same starting pitches and rhythm, different melodic movement
        let varied = line("v", &[60, 67, 62, 69], 0.0);

        let exact = compare_melodies(&query, &varied, &bigrams()).unwrap();
        assert_eq!(exact.score, 0.0);
        assert_eq!(exact.null_span_matches, 0);

        let config = bigrams().with_comparator(Comparator::NullSpanFallback);
        let fallback = compare_melodies(&query, &varied, &config).unwrap();
        assert_eq!(fallback.exact_matches, 0);
        assert_eq!(fallback.null_span_matches, 2);
        assert_eq!(fallback.score, 0.5);

        let different_rhythm = melody("r", &[(60, 0.0, 0.5), (67, 0.5, 0.5), (62, 1.0, 0.5)]);
        let none = compare_melodies(&query, &different_rhythm, &config).unwrap();
        assert_eq!(none.score, 0.0);
    }

    #[test]
    fn null_span_only_uses_leftover_candidates() {
        env_logger::try_init().unwrap_or(());

        // one candidate n-gram, claimed exactly by the first query n-gram
        let query = line("q", &[60, 62, 64], 0.0);
        let candidate = line("c", &[60, 62], 0.0);

        let config = bigrams().with_comparator(Comparator::NullSpanFallback);
        let scored = compare_melodies(&query, &candidate, &config).unwrap();
        assert_eq!(scored.exact_matches, 1);
        assert_eq!(scored.null_span_matches, 0);
        assert_eq!(scored.score, 0.5);
    }

    #[test]
    fn ranking_is_descending_with_id_tiebreak() {
        env_logger::try_init().unwrap_or(());

        let query = line("query", &[60, 62, 64, 65], 0.0);
        let melodies = collection(vec![
            line("zeta", &[60, 62, 64, 65], 4.0),
            line("alpha", &[60, 62, 64, 65], 0.0),
            line("partial", &[60, 62, 70, 72], 0.0),
            line("none", &[40, 41, 42, 43], 0.0),
        ]);

        let ranking = rank(&query, &melodies, &bigrams()).unwrap();
        let ids: Vec<&str> = ranking.iter().map(|m| m.melody_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta", "partial", "none"]);
        assert_eq!(ranking[0].score, 1.0);
        assert_eq!(ranking[3].score, 0.0);
    }

    #[test]
    fn threshold_and_max_results() {
        env_logger::try_init().unwrap_or(());

        let query = line("query", &[60, 62, 64, 65], 0.0);
        let melodies = collection(vec![
            line("a", &[60, 62, 64, 65], 0.0),
            line("b", &[60, 62, 64, 65], 0.0),
            line("c", &[60, 62, 70, 72], 0.0),
            line("d", &[40, 41, 42, 43], 0.0),
        ]);

        let mut config = bigrams();
        config.threshold = 0.1;
        let ranking = rank(&query, &melodies, &config).unwrap();
        assert_eq!(ranking.len(), 3);

        config.max_results = Some(1);
        let ranking = rank(&query, &melodies, &config).unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].melody_id, "a");

        config.threshold = f64::NAN;
        config.max_results = None;
        let ranking = rank(&query, &melodies, &config).unwrap();
        assert_eq!(ranking.len(), 4);
    }

    #[test]
    fn degenerate_inputs_do_not_fail() {
        env_logger::try_init().unwrap_or(());

        let query = line("query", &[60, 62, 64], 0.0);

        let empty = collection(Vec::new());
        assert!(rank(&query, &empty, &bigrams()).unwrap().is_empty());

        let short = collection(vec![line("short", &[60], 0.0), line("blank", &[], 0.0)]);
        let ranking = rank(&query, &short, &bigrams()).unwrap();
        assert_eq!(ranking.len(), 2);
        assert!(ranking.iter().all(|m| m.score == 0.0));
        assert_eq!(ranking[0].melody_id, "blank");

        let nothing = MelodyBuilder::new("nothing").build();
        assert!(rank(&nothing, &short, &bigrams()).unwrap().is_empty());

        let trigrams = CompareConfig::default().with_ngram_size(3);
        let ranking = rank(&query, &short, &trigrams).unwrap();
        assert_eq!(ranking.len(), 2);
        assert!(ranking.iter().all(|m| m.score == 0.0 && m.query_ngrams == 1));

        let wide = CompareConfig::default().with_ngram_size(10);
        assert!(rank(&query, &short, &wide).unwrap().is_empty());
    }

    #[test]
    fn zero_width_is_invalid() {
        env_logger::try_init().unwrap_or(());

        let query = line("query", &[60, 62, 64], 0.0);
        let melodies = collection(vec![line("a", &[60, 62], 0.0)]);
        let config = CompareConfig::default().with_ngram_size(0);
        assert!(rank(&query, &melodies, &config).is_err());
    }
}
