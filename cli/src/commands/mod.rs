mod account;
mod dashboard;
mod exercise;
mod helpers;
mod import;
mod nutrition;
mod settings;
mod workout;

pub(crate) use account::{cmd_login, cmd_logout, cmd_signup, cmd_whoami};
pub(crate) use dashboard::cmd_dashboard;
pub(crate) use exercise::{cmd_exercise_add, cmd_exercise_delete, cmd_exercise_list, cmd_exercise_show};
pub(crate) use helpers::{require_user, today};
pub(crate) use import::{cmd_export, cmd_import};
pub(crate) use nutrition::{
    NutritionInput, cmd_nutrition_delete, cmd_nutrition_edit, cmd_nutrition_list,
    cmd_nutrition_log,
};
pub(crate) use settings::{cmd_theme, load_theme};
pub(crate) use workout::{
    DraftAction, cmd_workout_delete, cmd_workout_draft, cmd_workout_list, cmd_workout_log,
    cmd_workout_show,
};
