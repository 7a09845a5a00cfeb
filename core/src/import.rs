use std::collections::HashMap;
use std::fmt;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    DATE_FORMAT, Exercise, NewExercise, NewNutritionLog, NewWorkoutEntry, round_half_up,
};
use crate::store::FitnessStore;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid JSON structure: {0}")]
    Malformed(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0:#}")]
    Backend(anyhow::Error),
    #[error("An import is already in progress")]
    Busy,
    #[error("No import file selected")]
    NothingToImport,
}

impl From<anyhow::Error> for ImportError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(err)
    }
}

/// Record counts per category, used both for the preview and the summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    pub exercises: usize,
    pub nutrition: usize,
    pub workouts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportPhase {
    Exercises,
    Nutrition,
    Workouts,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exercises => "exercises",
            Self::Nutrition => "nutrition",
            Self::Workouts => "workouts",
        })
    }
}

/// A parsed upload. Records stay untyped until their phase runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportDocument {
    exercises: Vec<Value>,
    nutrition: Vec<Value>,
    workouts: Vec<Value>,
}

impl ImportDocument {
    pub fn parse(text: &str) -> Result<Self, ImportError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ImportError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Fields that are missing or not arrays are treated as empty.
    pub fn from_value(value: Value) -> Result<Self, ImportError> {
        let Value::Object(mut root) = value else {
            return Err(ImportError::Malformed(
                "expected a JSON object at the top level".to_string(),
            ));
        };
        let mut take = |key: &str| match root.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        Ok(Self {
            exercises: take("exercises"),
            nutrition: take("nutrition"),
            workouts: take("workouts"),
        })
    }

    #[must_use]
    pub fn exercises(&self) -> &[Value] {
        &self.exercises
    }

    #[must_use]
    pub fn nutrition(&self) -> &[Value] {
        &self.nutrition
    }

    #[must_use]
    pub fn workouts(&self) -> &[Value] {
        &self.workouts
    }

    #[must_use]
    pub fn preview(&self) -> ImportCounts {
        ImportCounts {
            exercises: self.exercises.len(),
            nutrition: self.nutrition.len(),
            workouts: self.workouts.len(),
        }
    }
}

/// Lowercased exercise name to exercise id.
#[derive(Debug, Clone, Default)]
pub struct ExerciseIndex {
    by_name: HashMap<String, i64>,
}

impl ExerciseIndex {
    #[must_use]
    pub fn from_library(library: &[Exercise]) -> Self {
        let by_name = library
            .iter()
            .map(|e| (e.name.to_lowercase(), e.id))
            .collect();
        Self { by_name }
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// One raw record plus its position, for error messages like `nutrition[3]: ...`.
struct Record<'a> {
    label: String,
    value: &'a Value,
}

impl<'a> Record<'a> {
    fn new(label: String, value: &'a Value) -> Result<Self, ImportError> {
        let record = Self { label, value };
        if !value.is_object() {
            return Err(record.invalid("expected an object"));
        }
        Ok(record)
    }

    fn invalid(&self, message: impl fmt::Display) -> ImportError {
        ImportError::Validation(format!("{}: {message}", self.label))
    }

    /// JSON `null` reads the same as a missing key.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.value.get(key).filter(|v| !v.is_null())
    }

    fn optional_str(&self, key: &str) -> Result<Option<&'a str>, ImportError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(format!("'{key}' must be a string"))),
        }
    }

    fn required_str(&self, key: &str) -> Result<&'a str, ImportError> {
        match self.optional_str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(self.invalid(format!("missing '{key}'"))),
        }
    }

    /// Numbers may also arrive as numeric strings, e.g. `"2200"`.
    fn number(&self, key: &str) -> Result<Option<f64>, ImportError> {
        let parsed = match self.get(key) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Some(_) => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(format!("'{key}' must be a number")))
    }

    fn rounded(&self, key: &str) -> Result<Option<i64>, ImportError> {
        Ok(self.number(key)?.map(round_half_up))
    }

    fn date(&self) -> Result<NaiveDate, ImportError> {
        let raw = self.required_str("date")?;
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|_| self.invalid(format!("invalid date '{raw}', expected YYYY-MM-DD")))
    }

    /// Empty notes are stored as NULL.
    fn notes(&self) -> Result<Option<&'a str>, ImportError> {
        Ok(self.optional_str("notes")?.filter(|n| !n.is_empty()))
    }

    /// `muscle_groups` wins; otherwise the legacy `muscle_group` string
    /// becomes a one-element list.
    fn muscle_groups(&self) -> Result<Vec<String>, ImportError> {
        match self.get("muscle_groups") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        self.invalid("'muscle_groups' must be a list of strings")
                    })
                })
                .collect(),
            Some(_) => Err(self.invalid("'muscle_groups' must be a list of strings")),
            None => Ok(self
                .optional_str("muscle_group")?
                .filter(|g| !g.is_empty())
                .map(|g| vec![g.to_string()])
                .unwrap_or_default()),
        }
    }
}

/// Phase 1: update matching exercises' muscle groups and insert the rest.
///
/// Returns the number of records processed and an index over the refreshed
/// library, which also covers exercises that were not part of the import.
pub fn reconcile_exercises<S: FitnessStore + ?Sized>(
    store: &S,
    user_id: i64,
    records: &[Value],
) -> Result<(usize, ExerciseIndex), ImportError> {
    let mut processed = 0;

    if !records.is_empty() {
        let mut existing: HashMap<String, i64> = store
            .exercises(user_id)
            .context("Failed to load exercise library")?
            .into_iter()
            .map(|e| (e.name.to_lowercase(), e.id))
            .collect();

        for (index, value) in records.iter().enumerate() {
            let record = Record::new(format!("exercises[{index}]"), value)?;
            let name = record.required_str("name")?;
            let muscle_groups = record.muscle_groups()?;
            let key = name.to_lowercase();

            if let Some(&id) = existing.get(&key) {
                debug!(name, id, "updating existing exercise");
                store
                    .update_muscle_groups(user_id, id, &muscle_groups)
                    .with_context(|| format!("Exercise import failed for '{name}'"))?;
            } else {
                let created = store
                    .create_exercise(
                        user_id,
                        &NewExercise {
                            name: name.to_string(),
                            muscle_groups,
                        },
                    )
                    .with_context(|| format!("Exercise import failed for '{name}'"))?;
                debug!(name, id = created.id, "created exercise");
                existing.insert(key, created.id);
            }
            processed += 1;
        }
    }

    let library = store
        .exercises(user_id)
        .context("Failed to reload exercise library")?;
    Ok((processed, ExerciseIndex::from_library(&library)))
}

/// Phase 2: replace the log for each imported date.
pub fn reconcile_nutrition<S: FitnessStore + ?Sized>(
    store: &S,
    user_id: i64,
    records: &[Value],
) -> Result<usize, ImportError> {
    let mut processed = 0;

    for (index, value) in records.iter().enumerate() {
        let record = Record::new(format!("nutrition[{index}]"), value)?;
        let date = record.date()?;
        let log = NewNutritionLog {
            date,
            calories: record.rounded("calories")?,
            protein: record.rounded("protein")?,
            carbs: record.rounded("carbs")?,
            fat: record.rounded("fat")?,
            notes: record.notes()?.map(str::to_string),
        };

        store
            .delete_nutrition_on(user_id, date)
            .and_then(|_| store.create_nutrition(user_id, &log))
            .with_context(|| format!("Nutrition import failed for {date}"))?;
        debug!(%date, "replaced nutrition log");
        processed += 1;
    }

    Ok(processed)
}

/// Phase 3: replace every workout on each imported date.
///
/// Entry exercises resolve through `index`; a name with no match is stored
/// with no exercise reference.
pub fn reconcile_workouts<S: FitnessStore + ?Sized>(
    store: &S,
    user_id: i64,
    records: &[Value],
    index: &ExerciseIndex,
) -> Result<usize, ImportError> {
    let mut processed = 0;

    for (position, value) in records.iter().enumerate() {
        let record = Record::new(format!("workouts[{position}]"), value)?;
        let date = record.date()?;
        let notes = record.notes()?;
        let entries = workout_entries(&record, index)?;

        let existing = store
            .workout_ids_on(user_id, date)
            .with_context(|| format!("Workout import failed for {date}"))?;
        if !existing.is_empty() {
            store
                .delete_workouts(user_id, &existing)
                .with_context(|| format!("Workout import failed for {date}"))?;
        }

        let workout_id = store
            .create_workout(user_id, date, notes)
            .with_context(|| format!("Workout import failed for {date}"))?;
        if !entries.is_empty() {
            store
                .create_workout_entries(workout_id, &entries)
                .with_context(|| format!("Workout import failed for {date}"))?;
        }
        debug!(%date, replaced = existing.len(), entries = entries.len(), "imported workout");
        processed += 1;
    }

    Ok(processed)
}

fn workout_entries(
    workout: &Record<'_>,
    index: &ExerciseIndex,
) -> Result<Vec<NewWorkoutEntry>, ImportError> {
    let items = match workout.get("entries") {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(workout.invalid("'entries' must be a list")),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let entry = Record::new(format!("{}.entries[{i}]", workout.label), item)?;
            let exercise_id = entry
                .optional_str("exercise")?
                .and_then(|name| index.resolve(name));
            Ok(NewWorkoutEntry::new(
                exercise_id,
                entry.rounded("sets")?,
                entry.rounded("reps")?,
                entry.number("weight")?,
            ))
        })
        .collect()
}

/// Run all three phases in order, notifying `on_phase` as each one starts.
pub fn run_import<S, F>(
    store: &S,
    user_id: i64,
    document: &ImportDocument,
    mut on_phase: F,
) -> Result<ImportCounts, ImportError>
where
    S: FitnessStore + ?Sized,
    F: FnMut(ImportPhase),
{
    let preview = document.preview();
    info!(
        user_id,
        exercises = preview.exercises,
        nutrition = preview.nutrition,
        workouts = preview.workouts,
        "starting import"
    );

    on_phase(ImportPhase::Exercises);
    let (exercises, index) = reconcile_exercises(store, user_id, document.exercises())?;

    on_phase(ImportPhase::Nutrition);
    let nutrition = reconcile_nutrition(store, user_id, document.nutrition())?;

    on_phase(ImportPhase::Workouts);
    let workouts = reconcile_workouts(store, user_id, document.workouts(), &index)?;

    let counts = ImportCounts {
        exercises,
        nutrition,
        workouts,
    };
    info!(user_id, ?counts, "import complete");
    Ok(counts)
}

#[derive(Debug, Default)]
pub enum ImportState {
    #[default]
    Idle,
    Previewing {
        document: ImportDocument,
        preview: ImportCounts,
    },
    Importing,
    Complete(ImportCounts),
    /// `document` is kept after a failed commit so it can be retried.
    Failed {
        message: String,
        document: Option<ImportDocument>,
    },
}

impl ImportState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Previewing { .. } => "previewing",
            Self::Importing => "importing",
            Self::Complete(_) => "complete",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Drives one upload from file selection through commit.
#[derive(Debug, Default)]
pub struct ImportSession {
    state: ImportState,
}

impl ImportSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &ImportState {
        &self.state
    }

    /// Parse a newly selected file and show its counts.
    pub fn select(&mut self, text: &str) -> Result<ImportCounts, ImportError> {
        if matches!(self.state, ImportState::Importing) {
            return Err(ImportError::Busy);
        }
        match ImportDocument::parse(text) {
            Ok(document) => Ok(self.select_document(document)),
            Err(err) => {
                self.state = ImportState::Failed {
                    message: err.to_string(),
                    document: None,
                };
                Err(err)
            }
        }
    }

    pub fn select_document(&mut self, document: ImportDocument) -> ImportCounts {
        let preview = document.preview();
        self.state = ImportState::Previewing { document, preview };
        preview
    }

    /// Counts of the document a commit would import, if any.
    #[must_use]
    pub fn pending(&self) -> Option<ImportCounts> {
        match &self.state {
            ImportState::Previewing { preview, .. } => Some(*preview),
            ImportState::Failed {
                document: Some(document),
                ..
            } => Some(document.preview()),
            _ => None,
        }
    }

    pub fn discard(&mut self) {
        if !matches!(self.state, ImportState::Importing) {
            self.state = ImportState::Idle;
        }
    }

    pub fn commit<S: FitnessStore + ?Sized>(
        &mut self,
        store: &S,
        user_id: i64,
    ) -> Result<ImportCounts, ImportError> {
        self.commit_with_progress(store, user_id, |_| {})
    }

    pub fn commit_with_progress<S, F>(
        &mut self,
        store: &S,
        user_id: i64,
        on_phase: F,
    ) -> Result<ImportCounts, ImportError>
    where
        S: FitnessStore + ?Sized,
        F: FnMut(ImportPhase),
    {
        let document = match std::mem::replace(&mut self.state, ImportState::Importing) {
            ImportState::Previewing { document, .. }
            | ImportState::Failed {
                document: Some(document),
                ..
            } => document,
            ImportState::Importing => return Err(ImportError::Busy),
            other => {
                self.state = other;
                return Err(ImportError::NothingToImport);
            }
        };

        match run_import(store, user_id, &document, on_phase) {
            Ok(counts) => {
                self.state = ImportState::Complete(counts);
                Ok(counts)
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "import failed");
                self.state = ImportState::Failed {
                    message: err.to_string(),
                    document: Some(document),
                };
                Err(err)
            }
        }
    }
}
