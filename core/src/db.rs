use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{
    DATE_FORMAT, Exercise, NewExercise, NewNutritionLog, NewWorkout, NewWorkoutEntry,
    NutritionLog, User, Workout, WorkoutEntry, WorkoutSummary,
};

/// A user-scoped row that does not exist. Carried inside `anyhow::Error`;
/// callers that care can `downcast_ref` it.
#[derive(Debug, thiserror::Error)]
#[error("{0} not found")]
pub struct NotFound(pub &'static str);

pub struct Database {
    conn: Connection,
}

/// Stored credentials for a user, used only by the auth module.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS exercises (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    muscle_groups TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_exercises_user_name
                    ON exercises(user_id, name COLLATE NOCASE);

                CREATE TABLE IF NOT EXISTS nutrition_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    calories INTEGER,
                    protein INTEGER,
                    carbs INTEGER,
                    fat INTEGER,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS workouts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_workouts_user_date ON workouts(user_id, date);

                CREATE TABLE IF NOT EXISTS workout_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workout_id INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
                    exercise_id INTEGER REFERENCES exercises(id) ON DELETE SET NULL,
                    sets INTEGER,
                    reps INTEGER,
                    weight REAL,
                    order_index INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_workout_entries_workout ON workout_entries(workout_id);
                CREATE INDEX IF NOT EXISTS idx_workout_entries_exercise ON workout_entries(exercise_id);

                CREATE TABLE IF NOT EXISTS user_settings (
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, key)
                );

                CREATE TABLE IF NOT EXISTS form_drafts (
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, key)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    // Expects columns: 0: id, 1: user_id, 2: name, 3: muscle_groups, 4: created_at
    fn exercise_from_row(row: &rusqlite::Row) -> rusqlite::Result<Exercise> {
        let groups: Option<String> = row.get(3)?;
        Ok(Exercise {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            muscle_groups: groups
                .and_then(|g| serde_json::from_str(&g).ok())
                .unwrap_or_default(),
            created_at: row.get(4)?,
        })
    }

    fn nutrition_from_row(row: &rusqlite::Row) -> rusqlite::Result<NutritionLog> {
        Ok(NutritionLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            calories: row.get(3)?,
            protein: row.get(4)?,
            carbs: row.get(5)?,
            fat: row.get(6)?,
            notes: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // Expects columns:
    // 0: we.id, 1: we.workout_id, 2: we.exercise_id, 3: e.name,
    // 4: we.sets, 5: we.reps, 6: we.weight, 7: we.order_index
    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutEntry> {
        Ok(WorkoutEntry {
            id: row.get(0)?,
            workout_id: row.get(1)?,
            exercise_id: row.get(2)?,
            exercise_name: row.get(3)?,
            sets: row.get(4)?,
            reps: row.get(5)?,
            weight: row.get(6)?,
            order_index: row.get(7)?,
        })
    }

    fn encode_muscle_groups(groups: &[String]) -> Result<Option<String>> {
        if groups.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(groups)?))
    }

    // --- Users & sessions ---

    pub fn insert_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO users (email, password_hash, created_at) VALUES (?1, ?2, ?3)",
                params![email, password_hash, now],
            )
            .with_context(|| format!("Failed to create user '{email}'"))?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, email, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?
            .ok_or_else(|| NotFound("User").into())
    }

    pub fn get_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        let creds = self
            .conn
            .query_row(
                "SELECT id, email, created_at, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(UserCredentials {
                        user: Self::user_from_row(row)?,
                        password_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(creds)
    }

    pub fn insert_session(&self, token_hash: &str, user_id: i64) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token_hash, user_id, now],
        )?;
        Ok(())
    }

    pub fn get_session_user(&self, token_hash: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.email, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token_hash = ?1",
                params![token_hash],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(rows > 0)
    }

    // --- Exercises ---

    pub fn insert_exercise(&self, user_id: i64, exercise: &NewExercise) -> Result<Exercise> {
        let now = Local::now().to_rfc3339();
        let groups = Self::encode_muscle_groups(&exercise.muscle_groups)?;
        self.conn
            .execute(
                "INSERT INTO exercises (user_id, name, muscle_groups, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, exercise.name, groups, now],
            )
            .with_context(|| format!("Failed to add exercise '{}'", exercise.name))?;
        let id = self.conn.last_insert_rowid();
        self.get_exercise(user_id, id)
    }

    pub fn get_exercise(&self, user_id: i64, id: i64) -> Result<Exercise> {
        self.conn
            .query_row(
                "SELECT id, user_id, name, muscle_groups, created_at
                 FROM exercises WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::exercise_from_row,
            )
            .optional()?
            .ok_or_else(|| NotFound("Exercise").into())
    }

    pub fn list_exercises(&self, user_id: i64) -> Result<Vec<Exercise>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, muscle_groups, created_at
             FROM exercises WHERE user_id = ?1 ORDER BY name COLLATE NOCASE, id",
        )?;
        let exercises = stmt
            .query_map(params![user_id], Self::exercise_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(exercises)
    }

    /// Case-insensitive lookup by exact name.
    pub fn find_exercise_by_name(&self, user_id: i64, name: &str) -> Result<Option<Exercise>> {
        let wanted = name.to_lowercase();
        Ok(self
            .list_exercises(user_id)?
            .into_iter()
            .find(|e| e.name.to_lowercase() == wanted))
    }

    pub fn count_exercises(&self, user_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM exercises WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn set_exercise_muscle_groups(
        &self,
        user_id: i64,
        id: i64,
        groups: &[String],
    ) -> Result<()> {
        let encoded = Self::encode_muscle_groups(groups)?;
        let rows = self.conn.execute(
            "UPDATE exercises SET muscle_groups = ?1 WHERE id = ?2 AND user_id = ?3",
            params![encoded, id, user_id],
        )?;
        if rows == 0 {
            return Err(NotFound("Exercise").into());
        }
        Ok(())
    }

    pub fn delete_exercise(&self, user_id: i64, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM exercises WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(NotFound("Exercise").into());
        }
        Ok(())
    }

    // --- Nutrition ---

    pub fn insert_nutrition(&self, user_id: i64, log: &NewNutritionLog) -> Result<NutritionLog> {
        let now = Local::now().to_rfc3339();
        let date_str = log.date.format(DATE_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO nutrition_logs (user_id, date, calories, protein, carbs, fat, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user_id, date_str, log.calories, log.protein, log.carbs, log.fat, log.notes, now, now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_nutrition(user_id, id)
    }

    /// Insert or replace the log for `(user, date)`.
    pub fn upsert_nutrition(&self, user_id: i64, log: &NewNutritionLog) -> Result<NutritionLog> {
        let now = Local::now().to_rfc3339();
        let date_str = log.date.format(DATE_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO nutrition_logs (user_id, date, calories, protein, carbs, fat, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id, date) DO UPDATE SET
                calories = excluded.calories,
                protein = excluded.protein,
                carbs = excluded.carbs,
                fat = excluded.fat,
                notes = excluded.notes,
                updated_at = excluded.updated_at",
            params![
                user_id, date_str, log.calories, log.protein, log.carbs, log.fat, log.notes, now, now
            ],
        )?;
        self.get_nutrition_for_date(user_id, log.date)?
            .context("Nutrition log not found after upsert")
    }

    pub fn update_nutrition(
        &self,
        user_id: i64,
        id: i64,
        log: &NewNutritionLog,
    ) -> Result<NutritionLog> {
        let now = Local::now().to_rfc3339();
        let date_str = log.date.format(DATE_FORMAT).to_string();
        let rows = self
            .conn
            .execute(
                "UPDATE nutrition_logs SET date = ?1, calories = ?2, protein = ?3, carbs = ?4,
                 fat = ?5, notes = ?6, updated_at = ?7 WHERE id = ?8 AND user_id = ?9",
                params![
                    date_str, log.calories, log.protein, log.carbs, log.fat, log.notes, now, id,
                    user_id
                ],
            )
            .with_context(|| format!("Another nutrition log already exists for {date_str}"))?;
        if rows == 0 {
            return Err(NotFound("Nutrition log").into());
        }
        self.get_nutrition(user_id, id)
    }

    pub fn get_nutrition(&self, user_id: i64, id: i64) -> Result<NutritionLog> {
        self.conn
            .query_row(
                "SELECT id, user_id, date, calories, protein, carbs, fat, notes, created_at, updated_at
                 FROM nutrition_logs WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::nutrition_from_row,
            )
            .optional()?
            .ok_or_else(|| NotFound("Nutrition log").into())
    }

    pub fn get_nutrition_for_date(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<NutritionLog>> {
        let date_str = date.format(DATE_FORMAT).to_string();
        let log = self
            .conn
            .query_row(
                "SELECT id, user_id, date, calories, protein, carbs, fat, notes, created_at, updated_at
                 FROM nutrition_logs WHERE user_id = ?1 AND date = ?2",
                params![user_id, date_str],
                Self::nutrition_from_row,
            )
            .optional()?;
        Ok(log)
    }

    /// Newest first.
    pub fn list_nutrition(&self, user_id: i64) -> Result<Vec<NutritionLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, date, calories, protein, carbs, fat, notes, created_at, updated_at
             FROM nutrition_logs WHERE user_id = ?1 ORDER BY date DESC, id DESC",
        )?;
        let logs = stmt
            .query_map(params![user_id], Self::nutrition_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Logs dated on or after `start`, oldest first.
    pub fn nutrition_since(&self, user_id: i64, start: NaiveDate) -> Result<Vec<NutritionLog>> {
        let start_str = start.format(DATE_FORMAT).to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, date, calories, protein, carbs, fat, notes, created_at, updated_at
             FROM nutrition_logs WHERE user_id = ?1 AND date >= ?2 ORDER BY date, id",
        )?;
        let logs = stmt
            .query_map(params![user_id, start_str], Self::nutrition_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn delete_nutrition_for_date(&self, user_id: i64, date: NaiveDate) -> Result<usize> {
        let date_str = date.format(DATE_FORMAT).to_string();
        let rows = self.conn.execute(
            "DELETE FROM nutrition_logs WHERE user_id = ?1 AND date = ?2",
            params![user_id, date_str],
        )?;
        Ok(rows)
    }

    pub fn delete_nutrition(&self, user_id: i64, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM nutrition_logs WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(NotFound("Nutrition log").into());
        }
        Ok(())
    }

    // --- Workouts ---

    /// Insert a workout row without entries, returning its id.
    pub fn insert_workout_row(
        &self,
        user_id: i64,
        date: NaiveDate,
        notes: Option<&str>,
    ) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        let date_str = date.format(DATE_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO workouts (user_id, date, notes, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, date_str, notes, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Append entries to a workout; `order_index` follows slice order from 0.
    pub fn insert_workout_entries(&self, workout_id: i64, entries: &[NewWorkoutEntry]) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO workout_entries (workout_id, exercise_id, sets, reps, weight, order_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (index, entry) in entries.iter().enumerate() {
            let order_index = i64::try_from(index)?;
            stmt.execute(params![
                workout_id,
                entry.exercise_id,
                entry.sets,
                entry.reps,
                entry.weight,
                order_index
            ])?;
        }
        Ok(())
    }

    /// Insert a workout and all of its entries atomically.
    pub fn insert_workout(&self, user_id: i64, workout: &NewWorkout) -> Result<Workout> {
        let tx = self.conn.unchecked_transaction()?;
        let id = self.insert_workout_row(user_id, workout.date, workout.notes.as_deref())?;
        self.insert_workout_entries(id, &workout.entries)?;
        tx.commit()?;
        self.get_workout(user_id, id)
    }

    pub fn get_workout(&self, user_id: i64, id: i64) -> Result<Workout> {
        let (date, notes, created_at) = self
            .conn
            .query_row(
                "SELECT date, notes, created_at FROM workouts WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or(NotFound("Workout"))?;
        Ok(Workout {
            id,
            user_id,
            date,
            notes,
            created_at,
            entries: self.get_workout_entries(id)?,
        })
    }

    pub fn get_workout_entries(&self, workout_id: i64) -> Result<Vec<WorkoutEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT we.id, we.workout_id, we.exercise_id, e.name, we.sets, we.reps, we.weight, we.order_index
             FROM workout_entries we
             LEFT JOIN exercises e ON e.id = we.exercise_id
             WHERE we.workout_id = ?1
             ORDER BY we.order_index, we.id",
        )?;
        let entries = stmt
            .query_map(params![workout_id], Self::entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// All workouts with entries, newest first.
    pub fn list_workouts(&self, user_id: i64) -> Result<Vec<Workout>> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM workouts WHERE user_id = ?1 ORDER BY date DESC, id DESC",
            )?;
            stmt.query_map(params![user_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        ids.into_iter()
            .map(|id| self.get_workout(user_id, id))
            .collect()
    }

    pub fn workout_ids_for_date(&self, user_id: i64, date: NaiveDate) -> Result<Vec<i64>> {
        let date_str = date.format(DATE_FORMAT).to_string();
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM workouts WHERE user_id = ?1 AND date = ?2 ORDER BY id")?;
        let ids = stmt
            .query_map(params![user_id, date_str], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Workouts dated on or after `start`, newest first, with entry counts.
    pub fn workouts_since(&self, user_id: i64, start: NaiveDate) -> Result<Vec<WorkoutSummary>> {
        let start_str = start.format(DATE_FORMAT).to_string();
        let mut stmt = self.conn.prepare(
            "SELECT w.id, w.date, w.notes,
                    (SELECT COUNT(*) FROM workout_entries we WHERE we.workout_id = w.id)
             FROM workouts w
             WHERE w.user_id = ?1 AND w.date >= ?2
             ORDER BY w.date DESC, w.id DESC",
        )?;
        let workouts = stmt
            .query_map(params![user_id, start_str], |row| {
                Ok(WorkoutSummary {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    notes: row.get(2)?,
                    entry_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(workouts)
    }

    /// Entries for one exercise paired with their workout date, oldest first.
    pub fn entries_for_exercise(
        &self,
        user_id: i64,
        exercise_id: i64,
    ) -> Result<Vec<(String, WorkoutEntry)>> {
        let mut stmt = self.conn.prepare(
            "SELECT we.id, we.workout_id, we.exercise_id, e.name, we.sets, we.reps, we.weight, we.order_index, w.date
             FROM workout_entries we
             JOIN workouts w ON w.id = we.workout_id
             LEFT JOIN exercises e ON e.id = we.exercise_id
             WHERE we.exercise_id = ?1 AND w.user_id = ?2
             ORDER BY w.date, w.id, we.order_index",
        )?;
        let rows = stmt
            .query_map(params![exercise_id, user_id], |row| {
                Ok((row.get::<_, String>(8)?, Self::entry_from_row(row)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_workouts_by_id(&self, user_id: i64, ids: &[i64]) -> Result<usize> {
        let mut deleted = 0;
        for id in ids {
            deleted += self.conn.execute(
                "DELETE FROM workouts WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
        }
        Ok(deleted)
    }

    pub fn delete_workout(&self, user_id: i64, id: i64) -> Result<()> {
        if self.delete_workouts_by_id(user_id, &[id])? == 0 {
            return Err(NotFound("Workout").into());
        }
        Ok(())
    }

    // --- User settings ---

    pub fn set_setting(&self, user_id: i64, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![user_id, key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, user_id: i64, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM user_settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // --- Form drafts ---

    pub fn get_draft(&self, user_id: i64, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM form_drafts WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn put_draft(&self, user_id: i64, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO form_drafts (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![user_id, key, value, now],
        )?;
        Ok(())
    }

    pub fn delete_draft(&self, user_id: i64, key: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM form_drafts WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_user(db: &Database) -> User {
        db.insert_user("lifter@example.com", "hash").unwrap()
    }

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn bench() -> NewExercise {
        NewExercise {
            name: "Bench Press".to_string(),
            muscle_groups: vec!["Chest".to_string(), "Triceps".to_string()],
        }
    }

    fn nutrition(day: &str, calories: Option<i64>) -> NewNutritionLog {
        NewNutritionLog {
            date: date(day),
            calories,
            protein: Some(150),
            carbs: None,
            fat: None,
            notes: None,
        }
    }

    #[test]
    fn test_insert_and_get_exercise() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let exercise = db.insert_exercise(user.id, &bench()).unwrap();

        assert_eq!(exercise.name, "Bench Press");
        assert_eq!(exercise.muscle_groups, vec!["Chest", "Triceps"]);
        assert_eq!(db.get_exercise(user.id, exercise.id).unwrap(), exercise);
    }

    #[test]
    fn test_exercise_without_groups_roundtrips_empty() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let exercise = db
            .insert_exercise(
                user.id,
                &NewExercise {
                    name: "Plank".to_string(),
                    muscle_groups: vec![],
                },
            )
            .unwrap();
        assert!(exercise.muscle_groups.is_empty());
    }

    #[test]
    fn test_exercise_names_unique_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        db.insert_exercise(user.id, &bench()).unwrap();
        let dup = NewExercise {
            name: "bench press".to_string(),
            muscle_groups: vec![],
        };
        assert!(db.insert_exercise(user.id, &dup).is_err());
    }

    #[test]
    fn test_exercises_scoped_per_user() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user(&db);
        let b = db.insert_user("other@example.com", "h").unwrap();
        let exercise = db.insert_exercise(a.id, &bench()).unwrap();
        db.insert_exercise(b.id, &bench()).unwrap();

        assert_eq!(db.list_exercises(a.id).unwrap().len(), 1);
        assert!(db.get_exercise(b.id, exercise.id).is_err());
        assert!(db.delete_exercise(b.id, exercise.id).is_err());
    }

    #[test]
    fn test_find_exercise_by_name() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let exercise = db.insert_exercise(user.id, &bench()).unwrap();
        let found = db.find_exercise_by_name(user.id, "BENCH PRESS").unwrap();
        assert_eq!(found.map(|e| e.id), Some(exercise.id));
        assert!(db.find_exercise_by_name(user.id, "Bench").unwrap().is_none());
    }

    #[test]
    fn test_set_muscle_groups_and_clear() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let exercise = db.insert_exercise(user.id, &bench()).unwrap();

        db.set_exercise_muscle_groups(user.id, exercise.id, &["Chest".to_string()])
            .unwrap();
        assert_eq!(
            db.get_exercise(user.id, exercise.id).unwrap().muscle_groups,
            vec!["Chest"]
        );

        db.set_exercise_muscle_groups(user.id, exercise.id, &[]).unwrap();
        assert!(db.get_exercise(user.id, exercise.id).unwrap().muscle_groups.is_empty());
    }

    #[test]
    fn test_upsert_nutrition_replaces_same_date() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let first = db.upsert_nutrition(user.id, &nutrition("2026-01-15", Some(2000))).unwrap();
        let second = db.upsert_nutrition(user.id, &nutrition("2026-01-15", Some(2400))).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.calories, Some(2400));
        assert_eq!(db.list_nutrition(user.id).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_nutrition_rejects_duplicate_date() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        db.insert_nutrition(user.id, &nutrition("2026-01-15", Some(2000))).unwrap();
        assert!(db.insert_nutrition(user.id, &nutrition("2026-01-15", Some(1)))
            .is_err());
    }

    #[test]
    fn test_update_nutrition() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let log = db.upsert_nutrition(user.id, &nutrition("2026-01-15", Some(2000))).unwrap();
        let mut changed = nutrition("2026-01-16", None);
        changed.notes = Some("rest day".to_string());

        let updated = db.update_nutrition(user.id, log.id, &changed).unwrap();
        assert_eq!(updated.date, "2026-01-16");
        assert_eq!(updated.calories, None);
        assert_eq!(updated.notes.as_deref(), Some("rest day"));

        assert!(db.update_nutrition(user.id, 9999, &changed).is_err());
    }

    #[test]
    fn test_list_nutrition_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        db.upsert_nutrition(user.id, &nutrition("2026-01-10", Some(1))).unwrap();
        db.upsert_nutrition(user.id, &nutrition("2026-01-12", Some(2))).unwrap();
        db.upsert_nutrition(user.id, &nutrition("2026-01-11", Some(3))).unwrap();

        let dates: Vec<String> = db
            .list_nutrition(user.id)
            .unwrap()
            .into_iter()
            .map(|l| l.date)
            .collect();
        assert_eq!(dates, vec!["2026-01-12", "2026-01-11", "2026-01-10"]);

        let since = db.nutrition_since(user.id, date("2026-01-11")).unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].date, "2026-01-11");
    }

    #[test]
    fn test_delete_nutrition_for_date() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        db.upsert_nutrition(user.id, &nutrition("2026-01-10", Some(1))).unwrap();
        assert_eq!(db.delete_nutrition_for_date(user.id, date("2026-01-10")).unwrap(), 1);
        assert_eq!(db.delete_nutrition_for_date(user.id, date("2026-01-10")).unwrap(), 0);
    }

    #[test]
    fn test_insert_workout_with_entries_in_order() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let bench = db.insert_exercise(user.id, &bench()).unwrap();
        let workout = db
            .insert_workout(
                user.id,
                &NewWorkout {
                    date: date("2026-01-15"),
                    notes: Some("Push day".to_string()),
                    entries: vec![
                        NewWorkoutEntry::new(Some(bench.id), Some(4), Some(8), Some(185.0)),
                        NewWorkoutEntry::new(None, Some(3), Some(12), None),
                    ],
                },
            )
            .unwrap();

        assert_eq!(workout.date, "2026-01-15");
        assert_eq!(workout.entries.len(), 2);
        assert_eq!(workout.entries[0].order_index, 0);
        assert_eq!(workout.entries[0].exercise_name.as_deref(), Some("Bench Press"));
        assert_eq!(workout.entries[1].order_index, 1);
        assert_eq!(workout.entries[1].exercise_id, None);
    }

    #[test]
    fn test_delete_workout_cascades_entries() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let workout = db
            .insert_workout(
                user.id,
                &NewWorkout {
                    date: date("2026-01-15"),
                    notes: None,
                    entries: vec![NewWorkoutEntry::new(None, Some(1), Some(1), None)],
                },
            )
            .unwrap();

        db.delete_workout(user.id, workout.id).unwrap();
        assert!(db.get_workout_entries(workout.id).unwrap().is_empty());
        assert!(db.delete_workout(user.id, workout.id).is_err());
    }

    #[test]
    fn test_delete_exercise_nulls_entry_reference() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let bench = db.insert_exercise(user.id, &bench()).unwrap();
        let workout = db
            .insert_workout(
                user.id,
                &NewWorkout {
                    date: date("2026-01-15"),
                    notes: None,
                    entries: vec![NewWorkoutEntry::new(Some(bench.id), Some(4), Some(8), None)],
                },
            )
            .unwrap();

        db.delete_exercise(user.id, bench.id).unwrap();
        let entries = db.get_workout(user.id, workout.id).unwrap().entries;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].exercise_id, None);
        assert_eq!(entries[0].exercise_name, None);
    }

    #[test]
    fn test_workouts_since_counts_entries() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        for (day, n) in [("2026-01-01", 1), ("2026-01-10", 3)] {
            db.insert_workout(
                user.id,
                &NewWorkout {
                    date: date(day),
                    notes: None,
                    entries: vec![NewWorkoutEntry::new(None, Some(1), None, None); n],
                },
            )
            .unwrap();
        }

        let recent = db.workouts_since(user.id, date("2026-01-05")).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].entry_count, 3);
        assert_eq!(db.workout_ids_for_date(user.id, date("2026-01-01")).unwrap().len(), 1);
    }

    #[test]
    fn test_entries_for_exercise_sorted_by_date() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let bench = db.insert_exercise(user.id, &bench()).unwrap();
        for (day, weight) in [("2026-02-01", 195.0), ("2026-01-01", 185.0)] {
            db.insert_workout(
                user.id,
                &NewWorkout {
                    date: date(day),
                    notes: None,
                    entries: vec![NewWorkoutEntry::new(Some(bench.id), Some(3), Some(5), Some(weight))],
                },
            )
            .unwrap();
        }

        let entries = db.entries_for_exercise(user.id, bench.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "2026-01-01");
        assert_eq!(entries[1].1.weight, Some(195.0));
    }

    #[test]
    fn test_settings_per_user() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user(&db);
        let b = db.insert_user("b@example.com", "h").unwrap();
        db.set_setting(a.id, "theme", "dark").unwrap();
        db.set_setting(a.id, "theme", "light").unwrap();

        assert_eq!(db.get_setting(a.id, "theme").unwrap().as_deref(), Some("light"));
        assert_eq!(db.get_setting(b.id, "theme").unwrap(), None);
    }

    #[test]
    fn test_draft_crud() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        db.put_draft(user.id, "k", "{}").unwrap();
        db.put_draft(user.id, "k", "[1]").unwrap();
        assert_eq!(db.get_draft(user.id, "k").unwrap().as_deref(), Some("[1]"));
        assert!(db.delete_draft(user.id, "k").unwrap());
        assert!(!db.delete_draft(user.id, "k").unwrap());
    }

    #[test]
    fn test_sessions() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        db.insert_session("abc", user.id).unwrap();
        assert_eq!(db.get_session_user("abc").unwrap(), Some(user));
        assert!(db.delete_session("abc").unwrap());
        assert_eq!(db.get_session_user("abc").unwrap(), None);
    }

    #[test]
    fn test_user_email_unique_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        test_user(&db);
        assert!(db.insert_user("LIFTER@example.com", "h").is_err());
        assert!(db.get_credentials("lifter@example.com").unwrap().is_some());
    }

    #[test]
    fn test_missing_rows_report_not_found() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let errors = [
            db.get_exercise(user.id, 42).unwrap_err(),
            db.get_workout(user.id, 42).unwrap_err(),
            db.delete_nutrition(user.id, 42).unwrap_err(),
            db.delete_workout(user.id, 42).unwrap_err(),
        ];
        for err in errors {
            assert!(err.downcast_ref::<NotFound>().is_some(), "{err:#}");
        }
        assert_eq!(
            db.get_workout(user.id, 42).unwrap_err().to_string(),
            "Workout not found"
        );
    }
}
