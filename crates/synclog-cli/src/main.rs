//! # synclog CLI
//!
//! Command-line utilities for inspecting, appending to, and compacting a
//! `SQLite` change log.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::Path;
use synclog_agent::{RebaseOutcome, Rebaser};
use synclog_core::{ChangeType, EventDraft, LamportClock, LatestPerObject, ObjectChange};
use synclog_store::{ChangeLogStore, SqliteStore};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "stats" => {
            if args.len() < 3 {
                eprintln!("Usage: synclog stats <db>");
                std::process::exit(1);
            }
            stats(&open(&args[2])?)?;
        }
        "append" => {
            if args.len() < 7 {
                eprintln!(
                    "Usage: synclog append <db> <replica> <insert|update|delete> <entity> <object-id> [properties-json]"
                );
                std::process::exit(1);
            }
            let mut store = open(&args[2])?;
            let change_type: ChangeType = args[4].parse().map_err(|err: String| anyhow!(err))?;
            let properties = match args.get(7) {
                Some(json) => serde_json::from_str(json).context("Invalid properties JSON")?,
                None => serde_json::Value::Null,
            };
            let change = ObjectChange::new(&args[5], &args[6], change_type, properties);
            append(&mut store, &args[3], change)?;
        }
        "rebase" => {
            if args.len() < 3 {
                eprintln!("Usage: synclog rebase <db> [--squash latest] [--model-version <v>]");
                std::process::exit(1);
            }
            let mut store = open(&args[2])?;
            let rebaser = rebaser_from_flags(&args[3..])?;
            let outcome = rebaser.rebase(&mut store).context("Rebase failed")?;
            print_outcome(outcome);
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn open(path: &str) -> Result<SqliteStore> {
    SqliteStore::open(Path::new(path)).with_context(|| format!("Failed to open {path}"))
}

fn stats(store: &SqliteStore) -> Result<()> {
    let counts = store.change_counts().context("Failed to count changes")?;
    let rebaser = Rebaser::new("1");
    let ratio = rebaser
        .estimated_compaction_ratio(store)
        .context("Failed to estimate compaction ratio")?;
    let worthwhile = rebaser
        .should_rebase(store)
        .context("Failed to evaluate rebase")?;
    let revisions = store
        .latest_revisions()
        .context("Failed to read revisions")?;

    println!("baseline:          {}", store.has_baseline()?);
    println!("events:            {}", store.count_events()?);
    println!("baseline changes:  {}", counts.baseline);
    println!("inserts:           {}", counts.inserts);
    println!("updates:           {}", counts.updates);
    println!("deletes:           {}", counts.deletes);
    println!("compaction ratio:  {ratio:.3}");
    println!("should rebase:     {worthwhile}");
    for revision in revisions.iter() {
        println!(
            "replica {}: revision {}, global count {}",
            revision.replica_id, revision.revision_number, revision.global_count
        );
    }
    Ok(())
}

fn append(store: &mut SqliteStore, replica_id: &str, change: ObjectChange) -> Result<()> {
    let observed = store
        .latest_revisions()
        .context("Failed to read revisions")?;
    let mut clock = LamportClock::from_vector(replica_id, &observed);
    let revision = clock.tick();
    let draft = EventDraft::new(revision.clone(), "1", vec![change]).with_observed(&observed);
    let id = store.append(draft).context("Failed to append event")?;
    println!(
        "Appended event {id} ({}: revision {}, global count {})",
        revision.replica_id, revision.revision_number, revision.global_count
    );
    Ok(())
}

fn rebaser_from_flags(flags: &[String]) -> Result<Rebaser> {
    let mut squash_latest = false;
    let mut model_version = "1".to_string();
    let mut iter = flags.iter();

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--squash" => match iter.next().map(String::as_str) {
                Some("latest") => squash_latest = true,
                Some("retain") => squash_latest = false,
                other => return Err(anyhow!("Invalid --squash value: {other:?}")),
            },
            "--model-version" => {
                model_version = iter
                    .next()
                    .cloned()
                    .context("--model-version needs a value")?;
            }
            other => return Err(anyhow!("Unknown flag: {other}")),
        }
    }

    let rebaser = Rebaser::new(model_version);
    Ok(if squash_latest {
        rebaser.with_squasher(LatestPerObject)
    } else {
        rebaser
    })
}

fn print_outcome(outcome: RebaseOutcome) {
    match outcome {
        RebaseOutcome::NoSafeThreshold => println!("Nothing to rebase: no safe threshold"),
        RebaseOutcome::NothingToFold { threshold } => {
            println!("Nothing to rebase at threshold {threshold}");
        }
        RebaseOutcome::Rebased {
            threshold,
            folded_events,
            baseline_changes,
        } => println!(
            "Rebased at threshold {threshold}: folded {folded_events} event(s), \
             baseline holds {baseline_changes} change(s)"
        ),
    }
}

fn print_help() {
    println!(
        r#"synclog CLI

USAGE:
    synclog <COMMAND> [OPTIONS]

COMMANDS:
    stats <db>                          Show change counts, compaction ratio, and revisions
    append <db> <replica> <type> <entity> <object-id> [json]
                                        Append one change as the replica's next event
    rebase <db> [--squash latest|retain] [--model-version <v>]
                                        Fold every safely foldable event into the baseline
    help                                Show this help message

EXAMPLES:
    synclog append notes.db replica-a insert Note n1 '{{"title":"draft"}}'
    synclog rebase notes.db --squash latest
    RUST_LOG=debug synclog stats notes.db
"#
    );
}
