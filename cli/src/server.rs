use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::commands::load_theme;
use crate::commands::today;
use fitlog_core::auth::{AuthError, authenticate, sign_in, sign_out, sign_up};
use fitlog_core::db::{Database, NotFound};
use fitlog_core::export::{ExportDocument, export_document};
use fitlog_core::import::{ImportCounts, ImportDocument, ImportError, ImportSession};
use fitlog_core::models::{
    Dashboard, Exercise, ExerciseProgress, NewExercise, NewNutritionLog, NewWorkout,
    NewWorkoutEntry, NutritionLog, ProgressRange, THEME_SETTING, Theme, User, Workout,
    normalize_muscle_groups, normalize_notes, parse_date, validate_exercise_name,
    validate_nutrition, validate_workout_entry,
};
use fitlog_core::stats::{build_dashboard, build_exercise_progress};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The authenticated caller, attached to the request by `require_auth`.
#[derive(Clone)]
struct Session {
    user: User,
    token: String,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    user: User,
    token: String,
}

#[derive(Deserialize)]
struct CreateExerciseRequest {
    name: String,
    #[serde(default)]
    muscle_groups: Vec<String>,
}

#[derive(Deserialize)]
struct ProgressQuery {
    range: Option<String>,
}

#[derive(Deserialize)]
struct WorkoutEntryRequest {
    exercise_id: i64,
    sets: Option<i64>,
    reps: Option<i64>,
    weight: Option<f64>,
}

#[derive(Deserialize)]
struct CreateWorkoutRequest {
    date: String,
    notes: Option<String>,
    #[serde(default)]
    entries: Vec<WorkoutEntryRequest>,
}

#[derive(Deserialize)]
struct NutritionRequest {
    date: String,
    calories: Option<i64>,
    protein: Option<i64>,
    carbs: Option<i64>,
    fat: Option<i64>,
    notes: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ThemeBody {
    theme: Theme,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(missing) = err.downcast_ref::<NotFound>() {
            return Self::NotFound(missing.to_string());
        }
        if let Some(auth) = err.downcast_ref::<AuthError>() {
            return match auth {
                AuthError::InvalidCredentials => Self::Unauthorized(auth.to_string()),
                _ => Self::BadRequest(auth.to_string()),
            };
        }
        Self::Internal(err)
    }
}

/// Every import failure is reported to the caller verbatim: a rejected
/// store call names the record it stopped at.
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

// --- Middleware ---

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return ApiError::Unauthorized("Invalid or missing session token".to_string())
            .into_response();
    };

    let user = {
        let db = state.db();
        authenticate(&db, &token)
    };
    match user {
        Ok(Some(user)) => {
            request.extensions_mut().insert(Session { user, token });
            next.run(request).await
        }
        Ok(None) => {
            ApiError::Unauthorized("Invalid or missing session token".to_string()).into_response()
        }
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Auth handlers ---

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let db = state.db();
    sign_up(&db, &req.email, &req.password)?;
    let (user, token) = sign_in(&db, &req.email, &req.password)?;
    Ok((StatusCode::CREATED, Json(SessionResponse { user, token })))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let db = state.db();
    let (user, token) = sign_in(&db, &req.email, &req.password)?;
    Ok(Json(SessionResponse { user, token }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<StatusCode, ApiError> {
    let db = state.db();
    sign_out(&db, &session.token)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Dashboard ---

async fn get_dashboard(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Dashboard>, ApiError> {
    let db = state.db();
    Ok(Json(build_dashboard(&db, session.user.id, today())?))
}

// --- Exercises ---

async fn list_exercises(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Exercise>>, ApiError> {
    let db = state.db();
    Ok(Json(db.list_exercises(session.user.id)?))
}

async fn create_exercise(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateExerciseRequest>,
) -> Result<(StatusCode, Json<Exercise>), ApiError> {
    let name = validate_exercise_name(&req.name).map_err(|e| bad_request(&e))?;
    let db = state.db();
    if db.find_exercise_by_name(session.user.id, &name)?.is_some() {
        return Err(ApiError::BadRequest(format!(
            "Exercise '{name}' already exists"
        )));
    }
    let exercise = db.insert_exercise(
        session.user.id,
        &NewExercise {
            name,
            muscle_groups: normalize_muscle_groups(&req.muscle_groups),
        },
    )?;
    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn delete_exercise(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state.db();
    db.delete_exercise(session.user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_exercise_progress(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<ExerciseProgress>, ApiError> {
    let range = match query.range.as_deref() {
        Some(r) => r.parse::<ProgressRange>().map_err(|e| bad_request(&e))?,
        None => ProgressRange::default(),
    };
    let db = state.db();
    Ok(Json(build_exercise_progress(
        &db,
        session.user.id,
        id,
        range,
        today(),
    )?))
}

// --- Workouts ---

async fn list_workouts(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Workout>>, ApiError> {
    let db = state.db();
    Ok(Json(db.list_workouts(session.user.id)?))
}

async fn create_workout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateWorkoutRequest>,
) -> Result<(StatusCode, Json<Workout>), ApiError> {
    let date = parse_date(&req.date).map_err(|e| bad_request(&e))?;
    if req.entries.is_empty() {
        return Err(ApiError::BadRequest(
            "Please add at least one exercise".to_string(),
        ));
    }

    let db = state.db();
    let mut entries = Vec::with_capacity(req.entries.len());
    for e in &req.entries {
        if let Err(err) = db.get_exercise(session.user.id, e.exercise_id) {
            return Err(if err.downcast_ref::<NotFound>().is_some() {
                ApiError::BadRequest(format!("Unknown exercise id {}", e.exercise_id))
            } else {
                ApiError::Internal(err)
            });
        }
        let entry = NewWorkoutEntry::new(Some(e.exercise_id), e.sets, e.reps, e.weight);
        validate_workout_entry(&entry).map_err(|e| bad_request(&e))?;
        entries.push(entry);
    }

    let workout = db.insert_workout(
        session.user.id,
        &NewWorkout {
            date,
            notes: normalize_notes(req.notes),
            entries,
        },
    )?;
    Ok((StatusCode::CREATED, Json(workout)))
}

async fn get_workout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> Result<Json<Workout>, ApiError> {
    let db = state.db();
    Ok(Json(db.get_workout(session.user.id, id)?))
}

async fn delete_workout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state.db();
    db.delete_workout(session.user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Nutrition ---

fn nutrition_from_request(req: NutritionRequest) -> Result<NewNutritionLog, ApiError> {
    let log = NewNutritionLog {
        date: parse_date(&req.date).map_err(|e| bad_request(&e))?,
        calories: req.calories,
        protein: req.protein,
        carbs: req.carbs,
        fat: req.fat,
        notes: normalize_notes(req.notes),
    };
    validate_nutrition(&log).map_err(|e| bad_request(&e))?;
    Ok(log)
}

async fn list_nutrition(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<NutritionLog>>, ApiError> {
    let db = state.db();
    Ok(Json(db.list_nutrition(session.user.id)?))
}

/// One log per date: posting an existing date replaces it.
async fn upsert_nutrition(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<NutritionRequest>,
) -> Result<Json<NutritionLog>, ApiError> {
    let log = nutrition_from_request(req)?;
    let db = state.db();
    Ok(Json(db.upsert_nutrition(session.user.id, &log)?))
}

async fn update_nutrition(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
    Json(req): Json<NutritionRequest>,
) -> Result<Json<NutritionLog>, ApiError> {
    let log = nutrition_from_request(req)?;
    let db = state.db();
    db.get_nutrition(session.user.id, id)?;
    let updated = db
        .update_nutrition(session.user.id, id, &log)
        .map_err(|e| bad_request(&e))?;
    Ok(Json(updated))
}

async fn delete_nutrition(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state.db();
    db.delete_nutrition(session.user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Import / export ---

async fn preview_import(body: String) -> Result<Json<ImportCounts>, ApiError> {
    Ok(Json(ImportDocument::parse(&body)?.preview()))
}

async fn run_import(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: String,
) -> Result<Json<ImportCounts>, ApiError> {
    let mut import = ImportSession::new();
    import.select(&body)?;
    let db = state.db();
    let counts = import.commit(&*db, session.user.id)?;
    info!(user_id = session.user.id, ?counts, "import via API");
    Ok(Json(counts))
}

async fn export_data(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ExportDocument>, ApiError> {
    let db = state.db();
    Ok(Json(export_document(&*db, session.user.id)?))
}

// --- Settings ---

async fn get_theme(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ThemeBody>, ApiError> {
    let db = state.db();
    Ok(Json(ThemeBody {
        theme: load_theme(&db, session.user.id)?,
    }))
}

async fn set_theme(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<ThemeBody>,
) -> Result<Json<ThemeBody>, ApiError> {
    let db = state.db();
    db.set_setting(session.user.id, THEME_SETTING, &req.theme.to_string())?;
    Ok(Json(req))
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login));

    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/exercises", get(list_exercises).post(create_exercise))
        .route("/api/exercises/{id}", axum::routing::delete(delete_exercise))
        .route("/api/exercises/{id}/progress", get(get_exercise_progress))
        .route("/api/workouts", get(list_workouts).post(create_workout))
        .route("/api/workouts/{id}", get(get_workout).delete(delete_workout))
        .route("/api/nutrition", get(list_nutrition).post(upsert_nutrition))
        .route(
            "/api/nutrition/{id}",
            axum::routing::put(update_nutrition).delete(delete_nutrition),
        )
        .route("/api/import/preview", post(preview_import))
        .route("/api/import", post(run_import))
        .route("/api/export", get(export_data))
        .route("/api/settings/theme", get(get_theme).put(set_theme))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Any device on your network can reach this API; accounts still require a session token."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!("Listening on http://{bind}:{port}");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
