use anyhow::Result;
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::{Exercise, NewExercise, NewNutritionLog, NewWorkoutEntry, NutritionLog, Workout};

/// The record store the import and export paths talk to.
///
/// Every call is scoped to one user and reports failure through its own
/// `Result`; callers decide whether a failure is fatal. `Database` is the
/// production implementation.
pub trait FitnessStore {
    fn exercises(&self, user_id: i64) -> Result<Vec<Exercise>>;
    fn create_exercise(&self, user_id: i64, exercise: &NewExercise) -> Result<Exercise>;
    fn update_muscle_groups(&self, user_id: i64, exercise_id: i64, groups: &[String])
    -> Result<()>;

    fn nutrition_logs(&self, user_id: i64) -> Result<Vec<NutritionLog>>;
    fn delete_nutrition_on(&self, user_id: i64, date: NaiveDate) -> Result<usize>;
    fn create_nutrition(&self, user_id: i64, log: &NewNutritionLog) -> Result<NutritionLog>;

    fn workouts(&self, user_id: i64) -> Result<Vec<Workout>>;
    fn workout_ids_on(&self, user_id: i64, date: NaiveDate) -> Result<Vec<i64>>;
    fn delete_workouts(&self, user_id: i64, ids: &[i64]) -> Result<usize>;
    fn create_workout(&self, user_id: i64, date: NaiveDate, notes: Option<&str>) -> Result<i64>;
    fn create_workout_entries(&self, workout_id: i64, entries: &[NewWorkoutEntry]) -> Result<()>;
}

impl FitnessStore for Database {
    fn exercises(&self, user_id: i64) -> Result<Vec<Exercise>> {
        self.list_exercises(user_id)
    }

    fn create_exercise(&self, user_id: i64, exercise: &NewExercise) -> Result<Exercise> {
        self.insert_exercise(user_id, exercise)
    }

    fn update_muscle_groups(
        &self,
        user_id: i64,
        exercise_id: i64,
        groups: &[String],
    ) -> Result<()> {
        self.set_exercise_muscle_groups(user_id, exercise_id, groups)
    }

    fn nutrition_logs(&self, user_id: i64) -> Result<Vec<NutritionLog>> {
        self.list_nutrition(user_id)
    }

    fn delete_nutrition_on(&self, user_id: i64, date: NaiveDate) -> Result<usize> {
        self.delete_nutrition_for_date(user_id, date)
    }

    fn create_nutrition(&self, user_id: i64, log: &NewNutritionLog) -> Result<NutritionLog> {
        self.insert_nutrition(user_id, log)
    }

    fn workouts(&self, user_id: i64) -> Result<Vec<Workout>> {
        self.list_workouts(user_id)
    }

    fn workout_ids_on(&self, user_id: i64, date: NaiveDate) -> Result<Vec<i64>> {
        self.workout_ids_for_date(user_id, date)
    }

    fn delete_workouts(&self, user_id: i64, ids: &[i64]) -> Result<usize> {
        self.delete_workouts_by_id(user_id, ids)
    }

    fn create_workout(&self, user_id: i64, date: NaiveDate, notes: Option<&str>) -> Result<i64> {
        self.insert_workout_row(user_id, date, notes)
    }

    fn create_workout_entries(&self, workout_id: i64, entries: &[NewWorkoutEntry]) -> Result<()> {
        self.insert_workout_entries(workout_id, entries)
    }
}
