use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use fitlog_core::db::Database;
use fitlog_core::draft::{
    FormDraft, UserDrafts, WORKOUT_DRAFT, WorkoutDraft, save_workout_draft,
};
use fitlog_core::models::{User, Workout};

use super::helpers::{format_entry, parse_date, parse_entry_spec, print_json, today, truncate};

fn print_workout(workout: &Workout) {
    println!("Workout #{} on {}", workout.id, workout.date);
    if let Some(ref n) = workout.notes {
        println!("  Notes: {n}");
    }
    for (i, e) in workout.entries.iter().enumerate() {
        println!(
            "  {}. {:<28} {}",
            i + 1,
            e.exercise_name.as_deref().unwrap_or("(deleted exercise)"),
            format_entry(e.sets, e.reps, e.weight)
        );
    }
}

pub(crate) fn cmd_workout_log(
    db: &Database,
    user: &User,
    entries: &[String],
    date: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let draft = WorkoutDraft {
        date: Some(parse_date(date)?.format("%Y-%m-%d").to_string()),
        notes: notes.unwrap_or_default(),
        entries: entries
            .iter()
            .map(|spec| parse_entry_spec(spec))
            .collect::<Result<Vec<_>>>()?,
    };
    let library = db.list_exercises(user.id)?;
    let new = draft.to_new_workout(&library, today())?;
    let workout = db.insert_workout(user.id, &new)?;

    if json {
        print_json(&workout)?;
    } else {
        println!("Logged workout #{} for {}", workout.id, workout.date);
    }
    Ok(())
}

pub(crate) fn cmd_workout_list(db: &Database, user: &User, limit: Option<usize>, json: bool) -> Result<()> {
    let mut workouts = db.list_workouts(user.id)?;
    if let Some(limit) = limit {
        workouts.truncate(limit);
    }

    if json {
        return print_json(&workouts);
    }
    if workouts.is_empty() {
        eprintln!("No workouts yet. Use `fitlog workout log` to record one.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct WorkoutRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Exercises")]
        exercises: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<WorkoutRow> = workouts
        .iter()
        .map(|w| WorkoutRow {
            id: w.id,
            date: w.date.clone(),
            exercises: truncate(
                &w.entries
                    .iter()
                    .map(|e| e.exercise_name.as_deref().unwrap_or("?"))
                    .collect::<Vec<_>>()
                    .join(", "),
                50,
            ),
            notes: w.notes.as_deref().map(|n| truncate(n, 30)).unwrap_or_default(),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_workout_show(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    let workout = db.get_workout(user.id, id)?;
    if json {
        print_json(&workout)
    } else {
        print_workout(&workout);
        Ok(())
    }
}

pub(crate) fn cmd_workout_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    db.delete_workout(user.id, id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": true, "id": id }));
    } else {
        println!("Deleted workout #{id}");
    }
    Ok(())
}

/// What to do to the saved workout draft.
pub(crate) enum DraftAction {
    Add(String),
    Remove(usize),
    Date(String),
    Notes(String),
    Show,
    Save,
    Discard,
}

pub(crate) fn cmd_workout_draft(
    db: &Database,
    user: &User,
    action: DraftAction,
    json: bool,
) -> Result<()> {
    let store = UserDrafts::new(db, user.id);
    let mut draft = FormDraft::load(&store, WORKOUT_DRAFT, WorkoutDraft::default())?;

    match action {
        DraftAction::Add(spec) => {
            let entry = parse_entry_spec(&spec)?;
            draft.update(|d| d.entries.push(entry))?;
        }
        DraftAction::Remove(position) => {
            if position == 0 {
                bail!("Entry numbers start at 1");
            }
            let mut value = draft.value().clone();
            let removed = value.remove_entry(position - 1)?;
            draft.set(value)?;
            if !json {
                eprintln!("Removed {}", removed.exercise);
            }
        }
        DraftAction::Date(date) => {
            let date = parse_date(Some(date))?.format("%Y-%m-%d").to_string();
            draft.update(|d| d.date = Some(date))?;
        }
        DraftAction::Notes(notes) => draft.update(|d| d.notes = notes)?,
        DraftAction::Show => {}
        DraftAction::Save => {
            let workout = save_workout_draft(db, user.id, &mut draft, today())?;
            if json {
                return print_json(&workout);
            }
            println!("Saved draft as workout #{} for {}", workout.id, workout.date);
            return Ok(());
        }
        DraftAction::Discard => {
            draft.clear()?;
            if json {
                println!("{}", serde_json::json!({ "discarded": true }));
            } else {
                println!("Discarded workout draft.");
            }
            return Ok(());
        }
    }

    if json {
        return print_json(draft.value());
    }
    let value = draft.value();
    println!(
        "Workout draft for {}",
        value.date.as_deref().unwrap_or("today")
    );
    if !value.notes.is_empty() {
        println!("  Notes: {}", value.notes);
    }
    if value.entries.is_empty() {
        println!("  No entries. Add one with `fitlog workout draft add 'Squat:5x5@225'`");
    }
    for (i, e) in value.entries.iter().enumerate() {
        println!(
            "  {}. {:<28} {}",
            i + 1,
            e.exercise,
            format_entry(e.sets, e.reps, e.weight)
        );
    }
    Ok(())
}
