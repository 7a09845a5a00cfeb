use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitlog_core::db::Database;
use fitlog_core::models::{
    NewNutritionLog, NutritionLog, User, normalize_notes, parse_date as parse_iso_date,
    validate_nutrition,
};

use super::helpers::{opt_cell, parse_date, print_json, truncate};

/// Values for one day's log as entered on the command line.
pub(crate) struct NutritionInput {
    pub calories: Option<i64>,
    pub protein: Option<i64>,
    pub carbs: Option<i64>,
    pub fat: Option<i64>,
    pub notes: Option<String>,
}

impl NutritionInput {
    fn into_log(self, date: chrono::NaiveDate) -> Result<NewNutritionLog> {
        let log = NewNutritionLog {
            date,
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            notes: normalize_notes(self.notes),
        };
        validate_nutrition(&log)?;
        Ok(log)
    }
}

fn print_log(verb: &str, log: &NutritionLog) {
    println!(
        "{verb} nutrition for {}: {} kcal, P {} / C {} / F {}",
        log.date,
        opt_cell(log.calories),
        opt_cell(log.protein),
        opt_cell(log.carbs),
        opt_cell(log.fat)
    );
    if let Some(ref n) = log.notes {
        println!("  Notes: {n}");
    }
}

/// Create or replace the log for a date.
pub(crate) fn cmd_nutrition_log(
    db: &Database,
    user: &User,
    date: Option<String>,
    input: NutritionInput,
    json: bool,
) -> Result<()> {
    let log = input.into_log(parse_date(date)?)?;
    let saved = db.upsert_nutrition(user.id, &log)?;

    if json {
        print_json(&saved)
    } else {
        print_log("Logged", &saved);
        Ok(())
    }
}

/// Overwrite every field of an existing log, including its date.
pub(crate) fn cmd_nutrition_edit(
    db: &Database,
    user: &User,
    id: i64,
    date: Option<String>,
    input: NutritionInput,
    json: bool,
) -> Result<()> {
    let existing = db.get_nutrition(user.id, id)?;
    let date = match date {
        Some(d) => parse_date(Some(d))?,
        None => parse_iso_date(&existing.date)?,
    };
    let log = input.into_log(date)?;
    let saved = db.update_nutrition(user.id, id, &log)?;

    if json {
        print_json(&saved)
    } else {
        print_log("Updated", &saved);
        Ok(())
    }
}

pub(crate) fn cmd_nutrition_list(
    db: &Database,
    user: &User,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut logs = db.list_nutrition(user.id)?;
    if let Some(limit) = limit {
        logs.truncate(limit);
    }

    if json {
        return print_json(&logs);
    }
    if logs.is_empty() {
        eprintln!("No nutrition logs yet. Use `fitlog nutrition log` to add one.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct NutritionRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<NutritionRow> = logs
        .iter()
        .map(|n| NutritionRow {
            id: n.id,
            date: n.date.clone(),
            calories: opt_cell(n.calories),
            protein: opt_cell(n.protein),
            carbs: opt_cell(n.carbs),
            fat: opt_cell(n.fat),
            notes: n.notes.as_deref().map(|s| truncate(s, 30)).unwrap_or_default(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_nutrition_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    db.delete_nutrition(user.id, id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": true, "id": id }));
    } else {
        println!("Deleted nutrition log #{id}");
    }
    Ok(())
}
