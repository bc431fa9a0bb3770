use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use melody_ngram::{
    Args, CompareConfig, InMemoryMelodyCollection, MelodyCollection, default_readers, get_ngrams,
    rank, reader_for,
};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = CompareConfig::from(&args);

    let readers = default_readers();
    let file_name = args
        .query
        .file_name()
        .and_then(|name| name.to_str())
        .context("query path has no file name")?;
    let Some(reader) = reader_for(&readers, file_name) else {
        bail!("No reader for query file '{}'..!", args.query.display());
    };
    let query_id = args
        .query
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!("Reading query melody: '{}'...", args.query.display());
    let query = reader.read(&query_id, &args.query)?;
    debug!("Query '{}' has {} notes..!", query.id(), query.len());

    info!("Loading collection: '{}'...", args.collection.display());
    let collection = InMemoryMelodyCollection::load(&args.collection, None)?;
    for warning in collection.load_warnings() {
        warn!("Skipped {}: {}", warning.path.display(), warning.reason);
    }

    if args.show_ngrams {
        let ngrams = get_ngrams(&query, config.ngram_size)?;
        println!("{} {}-grams in '{}':", ngrams.len(), config.ngram_size, query.id());
        for ngram in &ngrams {
            println!("  {ngram}");
        }
    }

    let ranking = rank(&query, &collection, &config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranking)?);
        return Ok(());
    }

    if ranking.is_empty() {
        info!(
            "No matches for '{}' among {} melodies..!",
            query.id(),
            collection.size()
        );
        return Ok(());
    }

    println!("{:>4}  {:<32} {:>7} {:>7} {:>9}", "rank", "melody", "score", "exact", "null-span");
    for (i, scored) in ranking.iter().enumerate() {
        println!(
            "{:>4}  {:<32} {:>7.4} {:>7} {:>9}",
            i + 1,
            scored.melody_id,
            scored.score,
            scored.exact_matches,
            scored.null_span_matches
        );
    }

    Ok(())
}
