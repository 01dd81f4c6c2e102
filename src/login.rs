use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    Form,
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use log::{info, warn};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AuthError;
use crate::identity::{UserData, current_user, sign_in, sign_out};
use crate::pages::Chrome;

/// File name of the user table inside the data directory.
pub const USERS_FILE: &str = "users.json";

/// Paths that need a signed-in user.
pub const PROTECTED_ROUTES: [&str; 3] = ["/dashboard", "/study-guide", "/profile"];

/// Paths only meaningful to anonymous visitors.
pub const AUTH_ROUTES: [&str; 2] = ["/login", "/register"];

/// A registered user as stored on disk
///
/// Keyed by lower-cased email in the users file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Stable id handed out at registration
    pub id: String,

    /// Email address (the login name)
    pub email: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,
}

impl User {
    pub fn identity(&self) -> UserData {
        UserData {
            id: self.id.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// Login form data
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,

    pub password: String,

    /// Where to go after logging in
    #[serde(default)]
    pub redirect: String,
}

/// Registration form data
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,

    pub password: String,

    /// Must match `password`
    pub confirm_password: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,
}

/// Query parameters understood by the login and register pages
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub redirect: Option<String>,
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// Users registered with this service, persisted as JSON.
pub struct UserDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserDirectory {
    /// Open the user table inside `data_dir`
    ///
    /// Creates the directory and an empty users file if they don't exist.
    ///
    /// # Arguments
    /// * `data_dir` - Directory holding the users file
    ///
    /// # Returns
    /// * `Result<UserDirectory, AuthError>` - The directory or an IO error
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, AuthError> {
        let dir = data_dir.as_ref();
        if !dir.exists() {
            create_dir_all(dir)?;
        }

        let path = dir.join(USERS_FILE);
        if !path.exists() {
            let mut file = File::create(&path)?;
            file.write_all(b"{}")?;
        }

        Ok(UserDirectory {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get all registered users, keyed by email
    fn get_users(&self) -> Result<HashMap<String, User>, AuthError> {
        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_users(&self, users: &HashMap<String, User>) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(users)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Register a new user
    ///
    /// The password is hashed before storage and the user gets a fresh id.
    ///
    /// # Arguments
    /// * `form` - Registration data; the password confirmation is not checked here
    ///
    /// # Returns
    /// * `Result<UserData, AuthError>` - The new user's identity
    ///
    /// # Errors
    /// * `AuthError::EmptyFields` if the email or password is blank
    /// * `AuthError::EmailTaken` if the email is already registered
    pub fn register(&self, form: &RegisterForm) -> Result<UserData, AuthError> {
        let email = normalize_email(&form.email);
        if email.is_empty() || form.password.is_empty() {
            return Err(AuthError::EmptyFields);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut users = self.get_users()?;
        if users.contains_key(&email) {
            return Err(AuthError::EmailTaken);
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            password_hash: hash_password(&form.password)?,
        };
        let identity = user.identity();

        users.insert(email, user);
        self.save_users(&users)?;
        Ok(identity)
    }

    /// Verify user credentials
    ///
    /// # Returns
    /// * `Result<UserData, AuthError>` - The user's identity if the password matches
    ///
    /// # Errors
    /// * `AuthError::InvalidCredentials` for an unknown email or a wrong password
    pub fn verify(&self, email: &str, password: &str) -> Result<UserData, AuthError> {
        let users = self.get_users()?;
        match users.get(&normalize_email(email)) {
            Some(user) if verify_password(password, &user.password_hash)? => Ok(user.identity()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password using Argon2id with a random salt
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Hashing)
}

/// Check a password against a stored Argon2 hash
fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::Hashing)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Only same-site absolute paths are followed after login.
///
/// Browsers read `/\\host` as `//host`, and control characters are
/// stripped or split on before the URL is resolved.
fn safe_redirect(target: &str) -> &str {
    let mut chars = target.chars();
    let same_site = chars.next() == Some('/')
        && !matches!(chars.next(), Some('/' | '\\'))
        && !target.chars().any(char::is_control);
    if same_site { target } else { "/dashboard" }
}

fn with_error(path: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?error={}", path, urlencoding::encode(message)))
}

/// Serve the login page
pub async fn serve_login_page(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Response {
    let data = serde_json::json!({
        "chrome": Chrome { user: None, notice: query.notice.as_deref(), error: query.error.as_deref() },
        "redirect": query.redirect.as_deref().unwrap_or(""),
    });
    state.pages.render("login", &data)
}

/// Serve the signup page
pub async fn serve_register_page(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Response {
    let data = serde_json::json!({
        "chrome": Chrome { user: None, notice: query.notice.as_deref(), error: query.error.as_deref() },
    });
    state.pages.render("register", &data)
}

/// Handle user login requests
///
/// Verifies the credentials and, if valid, stores the identity cookie and
/// redirects to the requested page (the dashboard by default).
pub async fn handle_login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let users = Arc::clone(&state.users);
    let (email, password) = (form.email.clone(), form.password.clone());
    let verified = tokio::task::spawn_blocking(move || users.verify(&email, &password))
        .await
        .unwrap_or_else(|e| Err(e.into()));

    match verified {
        Ok(user) => {
            info!("user {} logged in", user.id);
            let target = safe_redirect(&form.redirect).to_string();
            (sign_in(jar, &user), Redirect::to(&target)).into_response()
        }
        Err(AuthError::InvalidCredentials) => {
            let mut target = format!(
                "/login?error={}",
                urlencoding::encode(&AuthError::InvalidCredentials.to_string())
            );
            if !form.redirect.is_empty() {
                target.push_str(&format!("&redirect={}", urlencoding::encode(&form.redirect)));
            }
            Redirect::to(&target).into_response()
        }
        Err(e) => {
            warn!("login failed: {}", e);
            with_error("/login", "Authentication error").into_response()
        }
    }
}

/// Handle user registration
///
/// Creates the account and signs the new user straight in.
pub async fn handle_register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.confirm_password {
        return with_error("/register", "Passwords do not match").into_response();
    }

    let users = Arc::clone(&state.users);
    let registered = tokio::task::spawn_blocking(move || users.register(&form))
        .await
        .unwrap_or_else(|e| Err(e.into()));

    match registered {
        Ok(user) => {
            info!("registered user {}", user.id);
            (sign_in(jar, &user), Redirect::to("/dashboard")).into_response()
        }
        Err(e @ (AuthError::EmptyFields | AuthError::EmailTaken)) => {
            with_error("/register", &e.to_string()).into_response()
        }
        Err(e) => {
            warn!("registration failed: {}", e);
            with_error("/register", "Signup failed. Please try again.").into_response()
        }
    }
}

/// Handle user logout
///
/// Clears the identity cookie and redirects to the login page.
pub async fn handle_logout(jar: SignedCookieJar) -> (SignedCookieJar, Redirect) {
    (sign_out(jar), Redirect::to("/login"))
}

/// Page gate
///
/// Anonymous requests for protected pages go to the login page (remembering
/// where they were headed); signed-in users are sent from the login and
/// signup pages to their dashboard. Everything else passes through.
pub async fn require_auth(jar: SignedCookieJar, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let signed_in = current_user(&jar).is_some();

    if !signed_in && PROTECTED_ROUTES.iter().any(|route| path.starts_with(route)) {
        return Redirect::to(&format!("/login?redirect={}", urlencoding::encode(&path)))
            .into_response();
    }

    if signed_in && AUTH_ROUTES.iter().any(|route| path.starts_with(route)) {
        return Redirect::to("/dashboard").into_response();
    }

    next.run(request).await
}
