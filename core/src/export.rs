use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{NutritionLog, Workout};
use crate::store::FitnessStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub exercises: Vec<ExportExercise>,
    pub nutrition: Vec<ExportNutrition>,
    pub workouts: Vec<ExportWorkout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportExercise {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub muscle_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNutrition {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportWorkout {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub entries: Vec<ExportEntry>,
}

/// An entry whose exercise was deleted has no `exercise` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl From<NutritionLog> for ExportNutrition {
    fn from(log: NutritionLog) -> Self {
        Self {
            date: log.date,
            calories: log.calories,
            protein: log.protein,
            carbs: log.carbs,
            fat: log.fat,
            notes: log.notes,
        }
    }
}

/// Build the export for one user.
///
/// Import replaces workouts by date, so workouts sharing a date are merged
/// into one: entries concatenate in id order and notes join with newlines.
pub fn export_document<S: FitnessStore + ?Sized>(store: &S, user_id: i64) -> Result<ExportDocument> {
    let mut exercises: Vec<ExportExercise> = store
        .exercises(user_id)?
        .into_iter()
        .map(|e| ExportExercise {
            name: e.name,
            muscle_groups: e.muscle_groups,
        })
        .collect();
    exercises.sort_by_key(|e| e.name.to_lowercase());

    let mut nutrition: Vec<ExportNutrition> = store
        .nutrition_logs(user_id)?
        .into_iter()
        .map(ExportNutrition::from)
        .collect();
    nutrition.sort_by(|a, b| a.date.cmp(&b.date));

    let mut workouts = store.workouts(user_id)?;
    workouts.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

    let mut by_date: BTreeMap<String, ExportWorkout> = BTreeMap::new();
    for workout in workouts {
        merge_workout(&mut by_date, workout);
    }

    Ok(ExportDocument {
        exercises,
        nutrition,
        workouts: by_date.into_values().collect(),
    })
}

fn merge_workout(by_date: &mut BTreeMap<String, ExportWorkout>, workout: Workout) {
    let entries = workout.entries.into_iter().map(|e| ExportEntry {
        exercise: e.exercise_name,
        sets: e.sets,
        reps: e.reps,
        weight: e.weight,
    });

    let merged = by_date
        .entry(workout.date.clone())
        .or_insert_with(|| ExportWorkout {
            date: workout.date,
            notes: None,
            entries: Vec::new(),
        });
    merged.entries.extend(entries);
    if let Some(notes) = workout.notes {
        merged.notes = Some(match merged.notes.take() {
            Some(prev) => format!("{prev}\n{notes}"),
            None => notes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::tests::{date, test_user};
    use crate::import::{ImportDocument, run_import};
    use crate::models::{NewExercise, NewNutritionLog, NewWorkout, NewWorkoutEntry};
    use serde_json::json;

    fn seed(db: &Database, user_id: i64) {
        let bench = db
            .insert_exercise(
                user_id,
                &NewExercise {
                    name: "Bench Press".to_string(),
                    muscle_groups: vec!["Chest".to_string(), "Triceps".to_string()],
                },
            )
            .unwrap();
        let squat = db
            .insert_exercise(
                user_id,
                &NewExercise {
                    name: "back squat".to_string(),
                    muscle_groups: vec![],
                },
            )
            .unwrap();
        db.upsert_nutrition(
            user_id,
            &NewNutritionLog {
                date: date("2026-01-16"),
                calories: Some(2400),
                protein: Some(170),
                carbs: None,
                fat: Some(70),
                notes: None,
            },
        )
        .unwrap();
        db.upsert_nutrition(
            user_id,
            &NewNutritionLog {
                date: date("2026-01-15"),
                calories: Some(2200),
                protein: None,
                carbs: None,
                fat: None,
                notes: Some("rest day".to_string()),
            },
        )
        .unwrap();
        db.insert_workout(
            user_id,
            &NewWorkout {
                date: date("2026-01-16"),
                notes: Some("Push".to_string()),
                entries: vec![
                    NewWorkoutEntry::new(Some(bench.id), Some(4), Some(8), Some(185.5)),
                    NewWorkoutEntry::new(Some(squat.id), Some(5), Some(5), None),
                ],
            },
        )
        .unwrap();
    }

    #[test]
    fn test_export_shape() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        seed(&db, user.id);

        let doc = export_document(&db, user.id).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "exercises": [
                    {"name": "back squat"},
                    {"name": "Bench Press", "muscle_groups": ["Chest", "Triceps"]}
                ],
                "nutrition": [
                    {"date": "2026-01-15", "calories": 2200, "notes": "rest day"},
                    {"date": "2026-01-16", "calories": 2400, "protein": 170, "fat": 70}
                ],
                "workouts": [{
                    "date": "2026-01-16",
                    "notes": "Push",
                    "entries": [
                        {"exercise": "Bench Press", "sets": 4, "reps": 8, "weight": 185.5},
                        {"exercise": "back squat", "sets": 5, "reps": 5}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        seed(&db, user.id);

        let before = export_document(&db, user.id).unwrap();
        let text = serde_json::to_string(&before).unwrap();
        let document = ImportDocument::parse(&text).unwrap();
        run_import(&db, user.id, &document, |_| {}).unwrap();
        let after = export_document(&db, user.id).unwrap();

        assert_eq!(before, after);
        assert_eq!(db.list_exercises(user.id).unwrap().len(), 2);
        assert_eq!(db.list_workouts(user.id).unwrap().len(), 1);
    }

    #[test]
    fn test_deleted_exercise_exports_without_name() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        seed(&db, user.id);
        let squat = db.find_exercise_by_name(user.id, "Back Squat").unwrap().unwrap();
        db.delete_exercise(user.id, squat.id).unwrap();

        let doc = export_document(&db, user.id).unwrap();
        let entry = &doc.workouts[0].entries[1];
        assert_eq!(entry.exercise, None);
        assert_eq!(entry.sets, Some(5));
    }

    #[test]
    fn test_same_date_workouts_merged() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let first = db
            .insert_workout_row(user.id, date("2026-01-15"), Some("AM"))
            .unwrap();
        db.insert_workout_entries(first, &[NewWorkoutEntry::new(None, Some(1), Some(1), None)])
            .unwrap();
        let second = db
            .insert_workout_row(user.id, date("2026-01-15"), Some("PM"))
            .unwrap();
        db.insert_workout_entries(second, &[NewWorkoutEntry::new(None, Some(2), Some(2), None)])
            .unwrap();

        let doc = export_document(&db, user.id).unwrap();
        assert_eq!(doc.workouts.len(), 1);
        assert_eq!(doc.workouts[0].notes.as_deref(), Some("AM\nPM"));
        let sets: Vec<_> = doc.workouts[0].entries.iter().map(|e| e.sets).collect();
        assert_eq!(sets, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_empty_export() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db);
        let doc = export_document(&db, user.id).unwrap();
        assert_eq!(doc, ExportDocument::default());
    }
}
