use crate::Comparator;
use log::info;

pub fn parse_comparator(s: &str) -> Comparator {
    match s.to_lowercase().as_str() {
        "e" | "exact" => Comparator::Exact,
        "n" | "ns" | "null" | "null-span" | "nullspan" | "fallback" => Comparator::NullSpanFallback,
        other => {
            info!("Unknown comparator '{}', defaulting to `exact`..!", other);
            Comparator::Exact
        }
    }
}
