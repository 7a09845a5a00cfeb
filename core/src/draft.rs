use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::Database;
use crate::models::{
    Exercise, NewWorkout, NewWorkoutEntry, Workout, normalize_notes, parse_date,
    validate_workout_entry,
};

/// Drafts are stored under `fitness-form-<name>`.
pub const DRAFT_KEY_PREFIX: &str = "fitness-form-";
pub const WORKOUT_DRAFT: &str = "workout";

pub trait DraftStore {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn clear(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    entries: RefCell<HashMap<String, String>>,
}

impl DraftStore for MemoryDraftStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Drafts kept in the database for one user.
pub struct UserDrafts<'a> {
    db: &'a Database,
    user_id: i64,
}

impl<'a> UserDrafts<'a> {
    #[must_use]
    pub fn new(db: &'a Database, user_id: i64) -> Self {
        Self { db, user_id }
    }
}

impl DraftStore for UserDrafts<'_> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.db.get_draft(self.user_id, key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.db.put_draft(self.user_id, key, value)
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.db.delete_draft(self.user_id, key)?;
        Ok(())
    }
}

/// A typed draft bound to a store. Every change is written through.
pub struct FormDraft<'a, T, S: DraftStore + ?Sized> {
    store: &'a S,
    key: String,
    initial: T,
    value: T,
}

impl<'a, T, S> FormDraft<'a, T, S>
where
    T: Serialize + DeserializeOwned + Clone,
    S: DraftStore + ?Sized,
{
    pub fn load(store: &'a S, name: &str, initial: T) -> Result<Self> {
        let key = format!("{DRAFT_KEY_PREFIX}{name}");
        let value = match store.read(&key)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "discarding unreadable draft");
                initial.clone()
            }),
            None => initial.clone(),
        };
        Ok(Self {
            store,
            key,
            initial,
            value,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) -> Result<()> {
        self.value = value;
        self.save()
    }

    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> Result<()> {
        f(&mut self.value);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.value).context("Failed to serialize draft")?;
        self.store.write(&self.key, &raw)
    }

    /// Forget the stored draft and go back to the initial value.
    pub fn clear(&mut self) -> Result<()> {
        self.value = self.initial.clone();
        self.store.clear(&self.key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftEntry {
    pub exercise: String,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
}

/// The workout form. A missing date means "today" at save time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDraft {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub entries: Vec<DraftEntry>,
}

impl WorkoutDraft {
    pub fn remove_entry(&mut self, position: usize) -> Result<DraftEntry> {
        if position >= self.entries.len() {
            bail!(
                "No entry #{} in the draft ({} entries)",
                position + 1,
                self.entries.len()
            );
        }
        Ok(self.entries.remove(position))
    }

    /// Resolve exercise names against `library` and build a workout.
    pub fn to_new_workout(&self, library: &[Exercise], today: NaiveDate) -> Result<NewWorkout> {
        if self.entries.is_empty() {
            bail!("Please add at least one exercise");
        }
        let date = match &self.date {
            Some(d) => parse_date(d)?,
            None => today,
        };

        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let Some(exercise) = library
                    .iter()
                    .find(|e| e.name.eq_ignore_ascii_case(entry.exercise.trim()))
                else {
                    bail!("Unknown exercise '{}'", entry.exercise);
                };
                let new =
                    NewWorkoutEntry::new(Some(exercise.id), entry.sets, entry.reps, entry.weight);
                validate_workout_entry(&new)
                    .with_context(|| format!("Invalid entry for {}", exercise.name))?;
                Ok(new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NewWorkout {
            date,
            notes: normalize_notes(Some(self.notes.clone())),
            entries,
        })
    }
}

/// Create the drafted workout, then clear the draft.
pub fn save_workout_draft<S: DraftStore + ?Sized>(
    db: &Database,
    user_id: i64,
    draft: &mut FormDraft<'_, WorkoutDraft, S>,
    today: NaiveDate,
) -> Result<Workout> {
    let library = db.list_exercises(user_id)?;
    let new = draft.value().to_new_workout(&library, today)?;
    let workout = db.insert_workout(user_id, &new)?;
    draft.clear()?;
    Ok(workout)
}
