use anyhow::Result;
use chrono::{Duration, NaiveDate};

use crate::db::Database;
use crate::models::{
    DATE_FORMAT, Dashboard, Exercise, ExerciseProgress, NutritionLog, ProgressPoint,
    ProgressRange, ProgressSession, WorkoutEntry, WorkoutSummary, round_half_up,
};

/// Days before `today` covered by the dashboard window.
pub const DASHBOARD_WINDOW_DAYS: i64 = 7;
pub const RECENT_WORKOUT_LIMIT: usize = 5;

pub fn build_dashboard(db: &Database, user_id: i64, today: NaiveDate) -> Result<Dashboard> {
    let start = today - Duration::days(DASHBOARD_WINDOW_DAYS);
    let workouts = db.workouts_since(user_id, start)?;
    let nutrition = db.nutrition_since(user_id, start)?;
    let total_exercises = db.count_exercises(user_id)?;
    Ok(summarize_dashboard(today, workouts, total_exercises, &nutrition))
}

/// `workouts` newest first. Rows dated after `today` are ignored.
#[must_use]
pub fn summarize_dashboard(
    today: NaiveDate,
    workouts: Vec<WorkoutSummary>,
    total_exercises: usize,
    nutrition: &[NutritionLog],
) -> Dashboard {
    let today_str = today.format(DATE_FORMAT).to_string();
    let in_window: Vec<WorkoutSummary> = workouts
        .into_iter()
        .filter(|w| w.date <= today_str)
        .collect();
    let nutrition: Vec<&NutritionLog> = nutrition.iter().filter(|n| n.date <= today_str).collect();

    let today_nutrition = nutrition
        .iter()
        .find(|n| n.date == today_str)
        .map(|n| (*n).clone());

    Dashboard {
        workouts_this_week: in_window.len(),
        total_exercises,
        avg_calories: average(nutrition.iter().map(|n| n.calories)),
        avg_protein: average(nutrition.iter().map(|n| n.protein)),
        recent_workouts: in_window.into_iter().take(RECENT_WORKOUT_LIMIT).collect(),
        today_nutrition,
        date: today_str,
    }
}

/// Missing values count as zero; an empty input averages to zero.
#[allow(clippy::cast_precision_loss)]
fn average(values: impl Iterator<Item = Option<i64>>) -> i64 {
    let (sum, count) = values.fold((0i64, 0usize), |(sum, count), v| {
        (sum + v.unwrap_or(0), count + 1)
    });
    if count == 0 {
        return 0;
    }
    round_half_up(sum as f64 / count as f64)
}

pub fn build_exercise_progress(
    db: &Database,
    user_id: i64,
    exercise_id: i64,
    range: ProgressRange,
    today: NaiveDate,
) -> Result<ExerciseProgress> {
    let exercise = db.get_exercise(user_id, exercise_id)?;
    let rows = db.entries_for_exercise(user_id, exercise_id)?;
    Ok(summarize_progress(exercise, range, today, rows))
}

/// `rows` are `(workout date, entry)` pairs, oldest first.
#[must_use]
pub fn summarize_progress(
    exercise: Exercise,
    range: ProgressRange,
    today: NaiveDate,
    rows: Vec<(String, WorkoutEntry)>,
) -> ExerciseProgress {
    let last_performed = rows.last().map(|(date, _)| date.clone());

    // Exclusive: the day exactly `days` back is outside the window
    let cutoff = range
        .days()
        .map(|days| (today - Duration::days(days)).format(DATE_FORMAT).to_string());
    let filtered: Vec<(String, WorkoutEntry)> = rows
        .into_iter()
        .filter(|(date, _)| cutoff.as_ref().is_none_or(|c| date > c))
        .collect();

    let personal_record = filtered
        .iter()
        .filter_map(|(_, e)| e.weight)
        .fold(0.0_f64, f64::max);
    let total_volume = filtered
        .iter()
        .map(|(_, e)| e.volume().unwrap_or(0.0))
        .sum();
    let chart = filtered
        .iter()
        .filter_map(|(date, e)| {
            e.weight.filter(|&w| w > 0.0).map(|weight| ProgressPoint {
                date: date.clone(),
                weight,
            })
        })
        .collect();
    let recent_sessions = filtered
        .iter()
        .rev()
        .map(|(date, e)| ProgressSession {
            workout_id: e.workout_id,
            date: date.clone(),
            sets: e.sets,
            reps: e.reps,
            weight: e.weight,
            volume: e.volume(),
        })
        .collect();

    ExerciseProgress {
        exercise,
        range,
        personal_record,
        sessions: filtered.len(),
        total_volume,
        last_performed,
        chart,
        recent_sessions,
    }
}
