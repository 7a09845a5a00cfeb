use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitlog_core::db::Database;
use fitlog_core::models::{
    NewExercise, ProgressRange, SUGGESTED_MUSCLE_GROUPS, User, normalize_muscle_groups,
    validate_exercise_name,
};
use fitlog_core::stats::build_exercise_progress;

use super::helpers::{format_entry, format_number, print_json, today, truncate};

pub(crate) fn cmd_exercise_add(
    db: &Database,
    user: &User,
    name: &str,
    muscle_groups: &[String],
    json: bool,
) -> Result<()> {
    let name = validate_exercise_name(name)?;
    if let Some(existing) = db.find_exercise_by_name(user.id, &name)? {
        bail!(
            "Exercise '{}' already exists (ID: {})",
            existing.name,
            existing.id
        );
    }
    let muscle_groups = normalize_muscle_groups(muscle_groups);
    for group in &muscle_groups {
        if !SUGGESTED_MUSCLE_GROUPS
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group))
        {
            eprintln!("Note: '{group}' is not a standard muscle group");
        }
    }

    let exercise = db.insert_exercise(user.id, &NewExercise { name, muscle_groups })?;

    if json {
        print_json(&exercise)?;
    } else {
        println!("Added exercise '{}' (ID: {})", exercise.name, exercise.id);
        if !exercise.muscle_groups.is_empty() {
            println!("  Muscle groups: {}", exercise.muscle_groups.join(", "));
        }
    }
    Ok(())
}

pub(crate) fn cmd_exercise_list(db: &Database, user: &User, json: bool) -> Result<()> {
    let exercises = db.list_exercises(user.id)?;

    if json {
        return print_json(&exercises);
    }
    if exercises.is_empty() {
        eprintln!("No exercises yet. Use `fitlog exercise add` to create one.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ExerciseRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Muscle groups")]
        groups: String,
    }

    let rows: Vec<ExerciseRow> = exercises
        .iter()
        .map(|e| ExerciseRow {
            id: e.id,
            name: truncate(&e.name, 35),
            groups: e.muscle_groups.join(", "),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_exercise_show(
    db: &Database,
    user: &User,
    id: i64,
    range: ProgressRange,
    json: bool,
) -> Result<()> {
    let progress = build_exercise_progress(db, user.id, id, range, today())?;

    if json {
        return print_json(&progress);
    }

    println!("{} (range: {})", progress.exercise.name, progress.range);
    if !progress.exercise.muscle_groups.is_empty() {
        println!("  Muscle groups:   {}", progress.exercise.muscle_groups.join(", "));
    }
    println!("  Personal record: {}", format_number(progress.personal_record));
    println!("  Sessions:        {}", progress.sessions);
    println!("  Total volume:    {}", format_number(progress.total_volume));
    println!(
        "  Last performed:  {}",
        progress.last_performed.as_deref().unwrap_or("never")
    );

    if progress.recent_sessions.is_empty() {
        return Ok(());
    }

    #[derive(Tabled)]
    struct SessionRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Workout")]
        workout: i64,
        #[tabled(rename = "Sets x Reps @ Weight")]
        detail: String,
        #[tabled(rename = "Volume")]
        volume: String,
    }

    let rows: Vec<SessionRow> = progress
        .recent_sessions
        .iter()
        .map(|s| SessionRow {
            date: s.date.clone(),
            workout: s.workout_id,
            detail: format_entry(s.sets, s.reps, s.weight),
            volume: s.volume.map_or("-".into(), format_number),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("\n{table}");
    Ok(())
}

pub(crate) fn cmd_exercise_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    let exercise = db.get_exercise(user.id, id)?;
    db.delete_exercise(user.id, id)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": true, "id": id, "name": exercise.name })
        );
    } else {
        println!("Deleted exercise '{}' (ID: {id})", exercise.name);
        println!("  Past workout entries keep their sets but lose the exercise link.");
    }
    Ok(())
}
