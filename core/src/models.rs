use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Muscle groups offered when adding an exercise. Free text is accepted too.
pub const SUGGESTED_MUSCLE_GROUPS: &[&str] = &[
    "Chest",
    "Back",
    "Shoulders",
    "Biceps",
    "Triceps",
    "Legs",
    "Core",
    "Cardio",
    "Full Body",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub muscle_groups: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewExercise {
    pub name: String,
    pub muscle_groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NutritionLog {
    pub id: i64,
    pub user_id: i64,
    pub date: String,
    pub calories: Option<i64>,
    pub protein: Option<i64>,
    pub carbs: Option<i64>,
    pub fat: Option<i64>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNutritionLog {
    pub date: NaiveDate,
    pub calories: Option<i64>,
    pub protein: Option<i64>,
    pub carbs: Option<i64>,
    pub fat: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub id: i64,
    pub user_id: i64,
    pub date: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub entries: Vec<WorkoutEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutEntry {
    pub id: i64,
    pub workout_id: i64,
    pub exercise_id: Option<i64>,
    // Joined for display; `None` when the exercise was deleted or never resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise_name: Option<String>,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub order_index: i64,
}

impl WorkoutEntry {
    /// Sets × reps × weight, when all three are recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn volume(&self) -> Option<f64> {
        match (self.sets, self.reps, self.weight) {
            (Some(s), Some(r), Some(w)) => Some(s as f64 * r as f64 * w),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewWorkout {
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub entries: Vec<NewWorkoutEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkoutEntry {
    pub exercise_id: Option<i64>,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
}

impl NewWorkoutEntry {
    /// Zero values are stored as "not recorded".
    #[must_use]
    pub fn new(
        exercise_id: Option<i64>,
        sets: Option<i64>,
        reps: Option<i64>,
        weight: Option<f64>,
    ) -> Self {
        Self {
            exercise_id,
            sets: sets.filter(|&v| v != 0),
            reps: reps.filter(|&v| v != 0),
            weight: weight.filter(|&v| v != 0.0),
        }
    }
}

/// A workout row with its entry count, as shown on the dashboard.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkoutSummary {
    pub id: i64,
    pub date: String,
    pub notes: Option<String>,
    pub entry_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dashboard {
    pub date: String,
    pub workouts_this_week: usize,
    pub total_exercises: usize,
    pub avg_calories: i64,
    pub avg_protein: i64,
    pub recent_workouts: Vec<WorkoutSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today_nutrition: Option<NutritionLog>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressRange {
    Month,
    Year,
    #[default]
    All,
}

impl ProgressRange {
    #[must_use]
    pub fn days(self) -> Option<i64> {
        match self {
            Self::Month => Some(30),
            Self::Year => Some(365),
            Self::All => None,
        }
    }
}

impl FromStr for ProgressRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            _ => bail!("Invalid range '{s}'. Use month, year, or all"),
        }
    }
}

impl fmt::Display for ProgressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressPoint {
    pub date: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressSession {
    pub workout_id: i64,
    pub date: String,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExerciseProgress {
    pub exercise: Exercise,
    pub range: ProgressRange,
    pub personal_record: f64,
    pub sessions: usize,
    pub total_volume: f64,
    pub last_performed: Option<String>,
    pub chart: Vec<ProgressPoint>,
    pub recent_sessions: Vec<ProgressSession>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => bail!("Invalid theme '{s}'. Use light or dark"),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Dark => "dark",
        })
    }
}

pub const THEME_SETTING: &str = "theme";

/// Round to the nearest integer with halves going toward positive infinity.
#[must_use]
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .with_context(|| format!("Invalid date '{date}'. Use YYYY-MM-DD"))
}

pub fn validate_exercise_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Exercise name must not be empty");
    }
    if name.chars().count() > 200 {
        bail!("Exercise name is too long (max 200 characters)");
    }
    Ok(name.to_string())
}

/// Trim tags, drop blanks, and drop case-insensitive repeats (first spelling wins).
#[must_use]
pub fn normalize_muscle_groups(groups: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for group in groups {
        let group = group.trim();
        if group.is_empty() {
            continue;
        }
        if !out.iter().any(|g| g.eq_ignore_ascii_case(group)) {
            out.push(group.to_string());
        }
    }
    out
}

pub fn validate_nutrition(log: &NewNutritionLog) -> Result<()> {
    for (label, value) in [
        ("calories", log.calories),
        ("protein", log.protein),
        ("carbs", log.carbs),
        ("fat", log.fat),
    ] {
        if value.is_some_and(|v| v < 0) {
            bail!("{label} must not be negative");
        }
    }
    Ok(())
}

pub fn validate_workout_entry(entry: &NewWorkoutEntry) -> Result<()> {
    if entry.sets.is_some_and(|v| v < 1) {
        bail!("sets must be at least 1");
    }
    if entry.reps.is_some_and(|v| v < 1) {
        bail!("reps must be at least 1");
    }
    if entry.weight.is_some_and(|v| v < 0.0 || !v.is_finite()) {
        bail!("weight must be a non-negative number");
    }
    Ok(())
}

/// Blank notes are stored as NULL.
#[must_use]
pub fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.filter(|n| !n.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.4), 2);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(149.6), 150);
        assert_eq!(round_half_up(0.0), 0);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
        );
        assert!(parse_date("15/01/2026").is_err());
        assert!(parse_date("2026-02-30").is_err());
    }

    #[test]
    fn test_validate_exercise_name() {
        assert_eq!(validate_exercise_name("  Squat ").unwrap(), "Squat");
        assert!(validate_exercise_name("   ").is_err());
        assert!(validate_exercise_name(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_normalize_muscle_groups() {
        let groups = vec![
            " Chest".to_string(),
            String::new(),
            "chest".to_string(),
            "Triceps".to_string(),
        ];
        assert_eq!(normalize_muscle_groups(&groups), vec!["Chest", "Triceps"]);
    }

    #[test]
    fn test_new_workout_entry_drops_zeroes() {
        let entry = NewWorkoutEntry::new(Some(1), Some(0), Some(8), Some(0.0));
        assert_eq!(entry.sets, None);
        assert_eq!(entry.reps, Some(8));
        assert_eq!(entry.weight, None);
    }

    #[test]
    fn test_validate_workout_entry() {
        assert!(validate_workout_entry(&NewWorkoutEntry::new(None, Some(3), Some(5), Some(100.0))).is_ok());
        assert!(validate_workout_entry(&NewWorkoutEntry::new(None, Some(-1), None, None)).is_err());
        assert!(validate_workout_entry(&NewWorkoutEntry::new(None, None, None, Some(-5.0))).is_err());
    }

    #[test]
    fn test_validate_nutrition_rejects_negative() {
        let log = NewNutritionLog {
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            calories: Some(-10),
            protein: None,
            carbs: None,
            fat: None,
            notes: None,
        };
        assert!(validate_nutrition(&log).is_err());
    }

    #[test]
    fn test_progress_range_parse() {
        assert_eq!("Month".parse::<ProgressRange>().unwrap(), ProgressRange::Month);
        assert_eq!(ProgressRange::Year.days(), Some(365));
        assert_eq!(ProgressRange::All.days(), None);
        assert!("week".parse::<ProgressRange>().is_err());
    }

    #[test]
    fn test_theme_parse_and_display() {
        assert_eq!("DARK".parse::<Theme>().unwrap(), Theme::Dark);
        assert_eq!(Theme::default().to_string(), "light");
        assert!("blue".parse::<Theme>().is_err());
    }

    #[test]
    fn test_entry_volume() {
        let entry = WorkoutEntry {
            id: 1,
            workout_id: 1,
            exercise_id: Some(1),
            exercise_name: None,
            sets: Some(4),
            reps: Some(8),
            weight: Some(185.0),
            order_index: 0,
        };
        assert_eq!(entry.volume(), Some(5920.0));
        let partial = WorkoutEntry { weight: None, ..entry };
        assert_eq!(partial.volume(), None);
    }
}
