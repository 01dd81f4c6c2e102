use axum::extract::{FromRef, FromRequestParts};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use log::debug;
use serde::{Deserialize, Serialize};

/// Name of the signed cookie carrying the signed-in user.
pub const USER_COOKIE: &str = "user-data";

/// How long the identity cookie stays valid.
pub const COOKIE_LIFETIME: time::Duration = time::Duration::weeks(1);

/// The identity stored in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    /// Stable user id
    pub id: String,

    pub email: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,
}

impl UserData {
    /// Name used in greetings: the first name, or the email when there is none.
    pub fn display_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.email
        } else {
            &self.first_name
        }
    }
}

/// Read the signed-in user from the cookie jar.
///
/// A missing cookie, a bad signature and unparsable JSON all mean "anonymous".
pub fn current_user(jar: &SignedCookieJar) -> Option<UserData> {
    let cookie = jar.get(USER_COOKIE)?;
    match serde_json::from_str(cookie.value()) {
        Ok(user) => Some(user),
        Err(e) => {
            debug!("ignoring unreadable identity cookie: {}", e);
            None
        }
    }
}

/// Add the identity cookie for `user` to the jar.
pub fn sign_in(jar: SignedCookieJar, user: &UserData) -> SignedCookieJar {
    let value = serde_json::to_string(user).unwrap_or_default();
    let cookie = Cookie::build((USER_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(COOKIE_LIFETIME);
    jar.add(cookie)
}

/// Remove the identity cookie.
pub fn sign_out(jar: SignedCookieJar) -> SignedCookieJar {
    jar.remove(Cookie::build(USER_COOKIE).path("/"))
}

/// Extractor for handlers that need a signed-in user.
///
/// Rejects with `401 Unauthorized` when there is no valid identity cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserData);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = match SignedCookieJar::<Key>::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        current_user(&jar)
            .map(CurrentUser)
            .ok_or((StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}
