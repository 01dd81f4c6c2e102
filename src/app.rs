use axum::{
    Form, Json, Router,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use handlebars::TemplateError;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::StoreError;
use crate::identity::{CurrentUser, current_user};
use crate::login::{
    UserDirectory, handle_login, handle_logout, handle_register, require_auth, serve_login_page,
    serve_register_page,
};
use crate::normalize::{normalize_value, to_persisted};
use crate::pages::{Chrome, EXAMPLE_EQUATIONS, Pages, step_views};
use crate::session::{self, SolveSession};
use crate::solver::{CommandSolver, EquationSolver};
use crate::step::{CanonicalStep, SolveOutcome};
use crate::store::{FileStore, GuideEntry, GuideSummary, StudyGuideStore};

pub const SAVED_NOTICE: &str = "Saved successfully!";
pub const MISSING_TITLE: &str = "Please provide a title or select an existing one.";
pub const NOTHING_TO_SAVE: &str = "Solve an equation before saving it.";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub solver: Arc<dyn EquationSolver>,
    pub store: Arc<dyn StudyGuideStore>,
    pub users: Arc<UserDirectory>,
    pub pages: Arc<Pages>,

    /// One solve session per signed-in user id
    sessions: Arc<Mutex<HashMap<String, SolveSession>>>,

    key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    pub fn new(
        solver: Arc<dyn EquationSolver>,
        store: Arc<dyn StudyGuideStore>,
        users: UserDirectory,
        key: Key,
    ) -> Result<Self, TemplateError> {
        Ok(AppState {
            solver,
            store,
            users: Arc::new(users),
            pages: Arc::new(Pages::new()?),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            key,
        })
    }

    fn with_session<R>(&self, user_id: &str, f: impl FnOnce(&mut SolveSession) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        f(sessions.entry(user_id.to_string()).or_default())
    }

    /// Solve `equation` on behalf of `user_id`.
    ///
    /// Its outcome becomes the user's current one only if no newer solve
    /// was started in the meantime; the requester gets its own outcome
    /// either way.
    pub async fn solve_for(&self, user_id: &str, equation: String) -> SolveOutcome {
        let ticket = self.with_session(user_id, |s| s.begin(&equation));
        let outcome = session::solve(self.solver.as_ref(), &equation).await;

        if !self.with_session(user_id, |s| s.apply(ticket, outcome.clone())) {
            info!("user {} started a newer solve; response not kept", user_id);
        }
        outcome
    }

    /// The user's applied input and its outcome, if any solve has completed.
    fn current(&self, user_id: &str) -> Option<(String, SolveOutcome)> {
        self.with_session(user_id, |s| {
            s.current()
                .map(|(input, outcome)| (input.to_string(), outcome.clone()))
        })
    }

    /// Run a store call on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn StudyGuideStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }

    pub async fn list_guides(&self, user_id: &str) -> Result<Vec<GuideSummary>, StoreError> {
        let user_id = user_id.to_string();
        self.with_store(move |store| store.list_guides(&user_id)).await
    }

    pub async fn create_guide(&self, user_id: &str, title: &str) -> Result<i64, StoreError> {
        let (user_id, title) = (user_id.to_string(), title.to_string());
        self.with_store(move |store| store.create_guide(&user_id, &title))
            .await
    }

    pub async fn find_guide(
        &self,
        user_id: &str,
        id: i64,
    ) -> Result<Option<GuideSummary>, StoreError> {
        let user_id = user_id.to_string();
        self.with_store(move |store| store.find_guide(&user_id, id)).await
    }

    pub async fn list_entries(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Vec<GuideEntry>, StoreError> {
        let (user_id, title) = (user_id.to_string(), title.to_string());
        self.with_store(move |store| store.list_entries(&user_id, &title))
            .await
    }

    /// Persist the user's current solved outcome under `title`.
    ///
    /// The equation saved is always the one the outcome was computed for,
    /// even while a newer solve is still running.
    ///
    /// # Returns
    /// * `Ok(None)` - Nothing solved yet, so nothing was saved
    /// * `Ok(Some(id))` - Id of the new entry
    pub async fn save_current(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Option<i64>, StoreError> {
        let Some((equation, SolveOutcome::Solved { final_text, steps })) = self.current(user_id)
        else {
            return Ok(None);
        };

        let (owner, guide) = (user_id.to_string(), title.to_string());
        let saved = equation.clone();
        let id = self
            .with_store(move |store| {
                store.append_entry(&owner, &guide, &saved, &final_text, to_persisted(&steps))
            })
            .await?;
        info!("user {} saved {:?} to {:?}", user_id, equation, title);
        Ok(Some(id))
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_landing))
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/register", get(serve_register_page).post(handle_register))
        .route("/logout", post(handle_logout))
        .route("/dashboard", get(serve_dashboard))
        .route("/study-guide", get(serve_study_guides))
        .route("/study-guide/save", post(save_to_study_guide))
        .route("/study-guide/:id", get(serve_study_guide))
        .route("/profile", get(serve_profile))
        .route("/api/solve", post(api_solve))
        .route(
            "/api/study-guides",
            get(api_list_guides).post(api_create_guide),
        )
        .route("/api/study-guides/:id/entries", get(api_list_entries))
        .route("/api/study-guides/entries", post(api_append_entry))
        .nest_service("/static", ServeDir::new("static"))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let key = match &config.session_secret {
        Some(secret) => Key::try_from(secret.as_bytes())?,
        None => {
            warn!("no session secret configured; sessions will not survive a restart");
            Key::generate()
        }
    };

    let solver = CommandSolver::new(config.solver.clone());
    let store = FileStore::open(&config.data_dir)?;
    let users = UserDirectory::open(&config.data_dir)?;
    info!("study guides stored in {}", store.path().display());

    let state = AppState::new(Arc::new(solver), Arc::new(store), users, key)?;
    let app = router(state);

    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

fn server_error(e: impl std::fmt::Display) -> Response {
    error!("request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong").into_response()
}

fn redirect_with(path: &str, key: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?{}={}", path, key, urlencoding::encode(message)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub equation: Option<String>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveForm {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub existing_title: String,
}

impl SaveForm {
    /// The new title if one was typed, otherwise the selected existing one.
    pub fn chosen_title(&self) -> Option<&str> {
        [self.title.trim(), self.existing_title.trim()]
            .into_iter()
            .find(|t| !t.is_empty())
    }
}

async fn serve_landing(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let user = current_user(&jar);
    let data = json!({
        "chrome": Chrome { user: user.as_ref(), notice: None, error: None },
    });
    state.pages.render("landing", &data)
}

async fn serve_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let (input, outcome) = match query.equation {
        Some(equation) => {
            let outcome = state.solve_for(&user.id, equation.clone()).await;
            (equation, Some(outcome))
        }
        None => match state.current(&user.id) {
            Some((input, outcome)) => (input, Some(outcome)),
            None => (String::new(), None),
        },
    };

    let guides = match state.list_guides(&user.id).await {
        Ok(guides) => guides,
        Err(e) => return server_error(e),
    };

    let examples: Vec<_> = EXAMPLE_EQUATIONS
        .iter()
        .map(|eq| json!({ "equation": eq, "query": urlencoding::encode(eq) }))
        .collect();

    let data = json!({
        "chrome": Chrome {
            user: Some(&user),
            notice: query.notice.as_deref(),
            error: query.error.as_deref(),
        },
        "greeting": user.display_name(),
        "equation": input,
        "solution": outcome.as_ref().map(SolveOutcome::solution_text),
        "solved": outcome.as_ref().is_some_and(SolveOutcome::is_solved),
        "steps": step_views(outcome.as_ref().map_or(&[][..], SolveOutcome::steps)),
        "guides": guides,
        "examples": examples,
    });
    state.pages.render("dashboard", &data)
}

async fn save_to_study_guide(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<SaveForm>,
) -> Redirect {
    let Some(title) = form.chosen_title() else {
        return redirect_with("/dashboard", "error", MISSING_TITLE);
    };

    match state.save_current(&user.id, title).await {
        Ok(Some(_)) => redirect_with("/dashboard", "notice", SAVED_NOTICE),
        Ok(None) => redirect_with("/dashboard", "error", NOTHING_TO_SAVE),
        Err(e) => {
            error!("saving for user {} failed: {}", user.id, e);
            redirect_with("/dashboard", "error", "Failed to save study guide entry.")
        }
    }
}

async fn serve_study_guides(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Response {
    match state.list_guides(&user.id).await {
        Ok(guides) => {
            let data = json!({
                "chrome": Chrome { user: Some(&user), notice: None, error: None },
                "guides": guides,
            });
            state.pages.render("study_guides", &data)
        }
        Err(e) => server_error(e),
    }
}

async fn serve_study_guide(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Response {
    let guide = match state.find_guide(&user.id, id).await {
        Ok(Some(guide)) => guide,
        Ok(None) => return (StatusCode::NOT_FOUND, "Study guide not found").into_response(),
        Err(e) => return server_error(e),
    };

    let entries = match state.list_entries(&user.id, &guide.title).await {
        Ok(entries) => entries,
        Err(e) => return server_error(e),
    };

    let entries: Vec<_> = entries
        .iter()
        .map(|entry| {
            json!({
                "equation": entry.equation,
                "solution": entry.solution,
                "steps": step_views(&normalize_value(&entry.steps)),
            })
        })
        .collect();

    let data = json!({
        "chrome": Chrome { user: Some(&user), notice: None, error: None },
        "title": guide.title,
        "entries": entries,
    });
    state.pages.render("study_guide", &data)
}

async fn serve_profile(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Response {
    let data = json!({
        "chrome": Chrome { user: Some(&user), notice: None, error: None },
    });
    state.pages.render("profile", &data)
}

#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    pub equation: String,
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

/// A saved entry with its steps in canonical form.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: i64,
    pub equation: String,
    pub solution: String,
    pub steps: Vec<CanonicalStep>,
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}

fn api_store_error(e: StoreError) -> Response {
    match e {
        StoreError::EmptyTitle => api_error(StatusCode::BAD_REQUEST, &e.to_string()),
        other => {
            error!("store request failed: {}", other);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
        }
    }
}

async fn api_solve(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SolveRequest>,
) -> Json<SolveOutcome> {
    Json(state.solve_for(&user.id, request.equation).await)
}

async fn api_list_guides(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<GuideSummary>>, Response> {
    state
        .list_guides(&user.id)
        .await
        .map(Json)
        .map_err(api_store_error)
}

async fn api_create_guide(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<TitleRequest>,
) -> Response {
    match state.create_guide(&user.id, &request.title).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(e) => api_store_error(e),
    }
}

async fn api_list_entries(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Response {
    let guide = match state.find_guide(&user.id, id).await {
        Ok(Some(guide)) => guide,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "study guide not found"),
        Err(e) => return api_store_error(e),
    };

    match state.list_entries(&user.id, &guide.title).await {
        Ok(entries) => Json(
            entries
                .into_iter()
                .map(|entry| EntryResponse {
                    steps: normalize_value(&entry.steps),
                    id: entry.id,
                    equation: entry.equation,
                    solution: entry.solution,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => api_store_error(e),
    }
}

async fn api_append_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<TitleRequest>,
) -> Response {
    match state.save_current(&user.id, &request.title).await {
        Ok(Some(id)) => Json(json!({ "id": id })).into_response(),
        Ok(None) => api_error(StatusCode::CONFLICT, NOTHING_TO_SAVE),
        Err(e) => api_store_error(e),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    /// Answers instantly, except for equations starting with "slow".
    struct SlowSolver;

    #[async_trait]
    impl EquationSolver for SlowSolver {
        async fn solve_equation(&self, equation: &str) -> Result<Value, SolverError> {
            if equation.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok(json!([{
                "changeType": "SOLVE_EQUATION",
                "oldEquation": equation,
                "newEquation": format!("solved {}", equation),
                "substeps": [],
            }]))
        }
    }

    fn state(dir: &tempfile::TempDir) -> AppState {
        let store = FileStore::open(dir.path()).unwrap();
        let users = UserDirectory::open(dir.path()).unwrap();
        AppState::new(Arc::new(SlowSolver), Arc::new(store), users, Key::generate()).unwrap()
    }

    #[tokio::test]
    async fn save_during_a_slow_solve_keeps_the_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);

        let first = state.solve_for("u", "x + 1 = 2".to_string()).await;
        assert_eq!(first.solution_text(), "solved x + 1 = 2");

        let background = state.clone();
        let slow = tokio::spawn(async move {
            background.solve_for("u", "slow 2x = 4".to_string()).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(state.save_current("u", "Guide").await.unwrap().is_some());
        let entries = state.list_entries("u", "Guide").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].equation, "x + 1 = 2");
        assert_eq!(entries[0].solution, "solved x + 1 = 2");

        slow.await.unwrap();
        let (input, outcome) = state.current("u").unwrap();
        assert_eq!(input, "slow 2x = 4");
        assert_eq!(outcome.solution_text(), "solved slow 2x = 4");
    }

    #[tokio::test]
    async fn nothing_is_saved_before_the_first_solve() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);

        assert_eq!(state.save_current("u", "Guide").await.unwrap(), None);
        assert!(state.list_guides("u").await.unwrap().is_empty());
    }
}
