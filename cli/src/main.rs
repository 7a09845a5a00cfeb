mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    DraftAction, NutritionInput, cmd_dashboard, cmd_exercise_add, cmd_exercise_delete,
    cmd_exercise_list, cmd_exercise_show, cmd_export, cmd_import, cmd_login, cmd_logout,
    cmd_nutrition_delete, cmd_nutrition_edit, cmd_nutrition_list, cmd_nutrition_log, cmd_signup,
    cmd_theme, cmd_whoami, cmd_workout_delete, cmd_workout_draft, cmd_workout_list,
    cmd_workout_log, cmd_workout_show, require_user,
};
use crate::config::Config;
use fitlog_core::db::Database;
use fitlog_core::models::{ProgressRange, Theme};

#[derive(Parser)]
#[command(
    name = "fitlog",
    version,
    about = "Track workouts, exercises and daily nutrition",
    long_about = "Track workouts, exercises and daily nutrition.\n\n\
                  Data lives in a local SQLite database. Set FITLOG_DATA_DIR to use a different location."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and log in
    Signup {
        /// Email address
        email: String,
        /// Password (prompted if omitted)
        #[arg(long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log in to an existing account
    Login {
        /// Email address
        email: String,
        /// Password (prompted if omitted)
        #[arg(long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// End the current session
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the logged-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Weekly overview: workouts, averages and today's nutrition
    Dashboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the exercise library
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommands,
    },
    /// Log and review workouts
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Log and review daily nutrition
    Nutrition {
        #[command(subcommand)]
        command: NutritionCommands,
    },
    /// Import exercises, nutrition and workouts from a JSON file
    Import {
        /// Path to the JSON file
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all data as JSON (re-importable)
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Account preferences
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum ExerciseCommands {
    /// Add an exercise to the library
    Add {
        /// Exercise name (unique, case-insensitive)
        name: String,
        /// Muscle group tag (repeatable, e.g. -m Chest -m Triceps)
        #[arg(short, long = "muscle-group")]
        muscle_group: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the exercise library
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show progress for one exercise
    Show {
        /// Exercise ID
        id: i64,
        /// Time range: month, year, all
        #[arg(short, long, default_value = "all")]
        range: ProgressRange,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an exercise (past workout entries are kept)
    Delete {
        /// Exercise ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Log a workout in one go
    Log {
        /// Entry as "Exercise:SETSxREPS@WEIGHT" (repeatable, e.g. "Bench Press:4x8@185")
        #[arg(short, long = "entry", required = true)]
        entry: Vec<String>,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List workouts, newest first
    List {
        /// Show at most N workouts
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one workout with its entries
    Show {
        /// Workout ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a workout and its entries
    Delete {
        /// Workout ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a workout step by step; the draft survives between runs
    Draft {
        #[command(subcommand)]
        command: DraftCommands,
    },
}

#[derive(Subcommand)]
enum DraftCommands {
    /// Add an entry ("Exercise:SETSxREPS@WEIGHT")
    Add {
        entry: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the entry at a 1-based position
    Remove {
        position: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the workout date
    Date {
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the workout notes
    Notes {
        notes: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current draft
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save the draft as a workout and clear it
    Save {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Throw the draft away
    Discard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum NutritionCommands {
    /// Log a day's nutrition (replaces any existing log for that date)
    Log {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Calories (kcal)
        #[arg(short, long)]
        calories: Option<i64>,
        /// Protein (g)
        #[arg(short, long)]
        protein: Option<i64>,
        /// Carbs (g)
        #[arg(long)]
        carbs: Option<i64>,
        /// Fat (g)
        #[arg(short, long)]
        fat: Option<i64>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the values of an existing log
    Edit {
        /// Nutrition log ID
        id: i64,
        /// Move the log to another date
        #[arg(long)]
        date: Option<String>,
        /// Calories (kcal)
        #[arg(short, long)]
        calories: Option<i64>,
        /// Protein (g)
        #[arg(short, long)]
        protein: Option<i64>,
        /// Carbs (g)
        #[arg(long)]
        carbs: Option<i64>,
        /// Fat (g)
        #[arg(short, long)]
        fat: Option<i64>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List nutrition logs, newest first
    List {
        /// Show at most N logs
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a nutrition log
    Delete {
        /// Nutrition log ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show or set the display theme
    Theme {
        /// light or dark (omit to show the current theme)
        value: Option<Theme>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn draft_action(command: DraftCommands) -> (DraftAction, bool) {
    match command {
        DraftCommands::Add { entry, json } => (DraftAction::Add(entry), json),
        DraftCommands::Remove { position, json } => (DraftAction::Remove(position), json),
        DraftCommands::Date { date, json } => (DraftAction::Date(date), json),
        DraftCommands::Notes { notes, json } => (DraftAction::Notes(notes), json),
        DraftCommands::Show { json } => (DraftAction::Show, json),
        DraftCommands::Save { json } => (DraftAction::Save, json),
        DraftCommands::Discard { json } => (DraftAction::Discard, json),
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Signup {
            email,
            password,
            json,
        } => cmd_signup(&db, &config, &email, password, json),
        Commands::Login {
            email,
            password,
            json,
        } => cmd_login(&db, &config, &email, password, json),
        Commands::Logout { json } => cmd_logout(&db, &config, json),
        Commands::Whoami { json } => cmd_whoami(&db, &config, json),
        Commands::Serve { port, bind } => server::start_server(db, port, &bind).await,
        Commands::Dashboard { json } => {
            let user = require_user(&db, &config)?;
            cmd_dashboard(&db, &user, json)
        }
        Commands::Exercise { command } => {
            let user = require_user(&db, &config)?;
            match command {
                ExerciseCommands::Add {
                    name,
                    muscle_group,
                    json,
                } => cmd_exercise_add(&db, &user, &name, &muscle_group, json),
                ExerciseCommands::List { json } => cmd_exercise_list(&db, &user, json),
                ExerciseCommands::Show { id, range, json } => {
                    cmd_exercise_show(&db, &user, id, range, json)
                }
                ExerciseCommands::Delete { id, json } => cmd_exercise_delete(&db, &user, id, json),
            }
        }
        Commands::Workout { command } => {
            let user = require_user(&db, &config)?;
            match command {
                WorkoutCommands::Log {
                    entry,
                    date,
                    notes,
                    json,
                } => cmd_workout_log(&db, &user, &entry, date, notes, json),
                WorkoutCommands::List { limit, json } => cmd_workout_list(&db, &user, limit, json),
                WorkoutCommands::Show { id, json } => cmd_workout_show(&db, &user, id, json),
                WorkoutCommands::Delete { id, json } => cmd_workout_delete(&db, &user, id, json),
                WorkoutCommands::Draft { command } => {
                    let (action, json) = draft_action(command);
                    cmd_workout_draft(&db, &user, action, json)
                }
            }
        }
        Commands::Nutrition { command } => {
            let user = require_user(&db, &config)?;
            match command {
                NutritionCommands::Log {
                    date,
                    calories,
                    protein,
                    carbs,
                    fat,
                    notes,
                    json,
                } => {
                    let input = NutritionInput {
                        calories,
                        protein,
                        carbs,
                        fat,
                        notes,
                    };
                    cmd_nutrition_log(&db, &user, date, input, json)
                }
                NutritionCommands::Edit {
                    id,
                    date,
                    calories,
                    protein,
                    carbs,
                    fat,
                    notes,
                    json,
                } => {
                    let input = NutritionInput {
                        calories,
                        protein,
                        carbs,
                        fat,
                        notes,
                    };
                    cmd_nutrition_edit(&db, &user, id, date, input, json)
                }
                NutritionCommands::List { limit, json } => {
                    cmd_nutrition_list(&db, &user, limit, json)
                }
                NutritionCommands::Delete { id, json } => {
                    cmd_nutrition_delete(&db, &user, id, json)
                }
            }
        }
        Commands::Import {
            file,
            dry_run,
            json,
        } => {
            let user = require_user(&db, &config)?;
            cmd_import(&db, &user, &file, dry_run, json)
        }
        Commands::Export { output } => {
            let user = require_user(&db, &config)?;
            cmd_export(&db, &user, output.as_deref())
        }
        Commands::Settings { command } => {
            let user = require_user(&db, &config)?;
            match command {
                SettingsCommands::Theme { value, json } => cmd_theme(&db, &user, value, json),
            }
        }
    }
}
