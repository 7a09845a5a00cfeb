use anyhow::Result;

use fitlog_core::db::Database;
use fitlog_core::models::User;
use fitlog_core::stats::build_dashboard;

use super::helpers::{opt_cell, print_json, today, truncate};

pub(crate) fn cmd_dashboard(db: &Database, user: &User, json: bool) -> Result<()> {
    let dash = build_dashboard(db, user.id, today())?;

    if json {
        return print_json(&dash);
    }

    println!("Dashboard for {}\n", dash.date);
    println!("  Workouts (last 7 days): {}", dash.workouts_this_week);
    println!("  Exercises in library:   {}", dash.total_exercises);
    println!("  Avg calories:           {}", dash.avg_calories);
    println!("  Avg protein:            {}g", dash.avg_protein);

    match &dash.today_nutrition {
        Some(n) => println!(
            "\n  Today: {} kcal, P {} / C {} / F {}",
            opt_cell(n.calories),
            opt_cell(n.protein),
            opt_cell(n.carbs),
            opt_cell(n.fat)
        ),
        None => println!("\n  Today: no nutrition logged"),
    }

    if dash.recent_workouts.is_empty() {
        println!("\n  No workouts this week. Use `fitlog workout log` to record one.");
    } else {
        println!("\n  Recent workouts:");
        for w in &dash.recent_workouts {
            let notes = w.notes.as_deref().map(|n| truncate(n, 40)).unwrap_or_default();
            println!(
                "    {}  #{:<4} {} exercise(s)  {notes}",
                w.date, w.id, w.entry_count
            );
        }
    }

    Ok(())
}
