use std::path::Path;

use anyhow::{Context, Result};

use fitlog_core::db::Database;
use fitlog_core::export::export_document;
use fitlog_core::import::{ImportCounts, ImportSession};
use fitlog_core::models::User;

fn print_counts(counts: &ImportCounts, verb: &str) {
    println!("  Exercises {verb}: {}", counts.exercises);
    println!("  Nutrition {verb}: {}", counts.nutrition);
    println!("  Workouts {verb}:  {}", counts.workouts);
}

pub fn cmd_import(db: &Database, user: &User, path: &Path, dry_run: bool, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let mut session = ImportSession::new();
    let preview = session.select(&text)?;

    if dry_run {
        if json {
            println!(
                "{}",
                serde_json::json!({ "dry_run": true, "preview": preview })
            );
        } else {
            println!("Dry run, no changes made.\n");
            print_counts(&preview, "to import");
        }
        return Ok(());
    }

    let summary = session.commit_with_progress(db, user.id, |phase| {
        if !json {
            eprintln!("Importing {phase}...");
        }
    })?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "dry_run": false, "imported": summary })
        );
    } else {
        println!("Import complete.\n");
        print_counts(&summary, "imported");
    }
    Ok(())
}

/// Write the export to `output`, or to stdout when no path is given.
pub fn cmd_export(db: &Database, user: &User, output: Option<&Path>) -> Result<()> {
    let document = export_document(db, user.id)?;
    let text = serde_json::to_string_pretty(&document)?;

    match output {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            eprintln!(
                "Exported {} exercises, {} nutrition logs, {} workouts to {}",
                document.exercises.len(),
                document.nutrition.len(),
                document.workouts.len(),
                path.display()
            );
        }
        None => println!("{text}"),
    }
    Ok(())
}
