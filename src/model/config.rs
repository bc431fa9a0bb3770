use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_NGRAM_SIZE: usize = 3;
pub const DEFAULT_NULL_SPAN_WEIGHT: f64 = 0.5;

#[derive(Parser, Debug)]
#[command(
    name = "melody_ngram",
    about = "Rank a collection of MIDI/ABC melodies by n-gram similarity to a query tune."
)]
pub struct Args {
    /// Path to the query melody (.mid, .midi or .abc).
    pub query: PathBuf,

    /// Directory (scanned recursively) or .zip archive holding the reference melodies.
    pub collection: PathBuf,

    /// Number of consecutive notes per n-gram.
    #[arg(short = 'n', long = "ngram", default_value_t = DEFAULT_NGRAM_SIZE)]
    pub ngram_size: usize,

    /// How n-grams are matched: exact|null-span.
    /// `null-span` also credits n-grams whose rhythm matches once pitch movement is flattened.
    #[arg(short, long, default_value = "exact")]
    pub comparator: String,

    /// Credit given to a null-span match, relative to an exact one (0.0..=1.0).
    #[arg(long = "null-span-weight", default_value_t = DEFAULT_NULL_SPAN_WEIGHT)]
    pub null_span_weight: f64,

    /// Maximum number of matches to print.
    #[arg(short, long, default_value_t = 10)]
    pub max_results: usize,

    /// Drop matches scoring below this value.
    #[arg(short, long, default_value_t = 0.0)]
    pub threshold: f64,

    /// Print the ranking as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Print the query's n-grams before ranking.
    #[arg(long = "show-ngrams", default_value_t = false)]
    pub show_ngrams: bool,
}

/// How query n-grams are matched against a candidate's n-grams.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// Only pitch+duration identical n-grams count.
    #[default]
    Exact,

    /// Exact matches first, then n-grams whose null spans agree earn partial credit.
    NullSpanFallback,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CompareConfig {
    pub ngram_size: usize,
    pub comparator: Comparator,
    pub null_span_weight: f64,
    pub max_results: Option<usize>,
    pub threshold: f64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            ngram_size: DEFAULT_NGRAM_SIZE,
            comparator: Comparator::Exact,
            null_span_weight: DEFAULT_NULL_SPAN_WEIGHT,
            max_results: None,
            threshold: 0.0,
        }
    }
}

impl CompareConfig {
    pub fn with_ngram_size(mut self, ngram_size: usize) -> Self {
        self.ngram_size = ngram_size;
        self
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Weight actually applied to null-span matches, clamped to `[0, 1]`.
    pub fn effective_null_span_weight(&self) -> f64 {
        if self.null_span_weight.is_nan() {
            return 0.0;
        }
        self.null_span_weight.clamp(0.0, 1.0)
    }

    /// Minimum score a match needs to be kept. NaN keeps everything.
    pub fn effective_threshold(&self) -> f64 {
        if self.threshold.is_nan() {
            return 0.0;
        }
        self.threshold
    }
}

impl From<&Args> for CompareConfig {
    fn from(args: &Args) -> Self {
        Self {
            ngram_size: args.ngram_size,
            comparator: crate::parse_comparator(&args.comparator),
            null_span_weight: args.null_span_weight,
            max_results: Some(args.max_results),
            threshold: args.threshold,
        }
    }
}
