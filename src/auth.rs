//! Login sessions, profile and user administration.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::{parse_id, SharedState};
use crate::error::AppError;
use crate::session::{Session, REMEMBER_DURATION, SESSION_DURATION};
use crate::store::{ActionEntry, Role, UserRecord};

pub const SESSION_COOKIE: &str = "sessionId";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(e) => Err(AppError::message(format!("Password hashing failed: {e}"))),
    }
}

/// A malformed stored hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Invalid password hash format: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// The account seeded into an empty user list: `admin` / `admin`.
pub fn default_admin() -> Result<UserRecord, AppError> {
    Ok(UserRecord {
        id: 1,
        name: "Super Admin".to_string(),
        login: "admin".to_string(),
        password_hash: hash_password("admin")?,
        role: Role::Super,
    })
}

/// The logged-in user, placed in request extensions by [`require_session`].
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub session_id: String,
    pub session: Session,
}

impl CurrentUser {
    pub fn require_super(&self) -> Result<(), AppError> {
        match self.session.role {
            Role::Super => Ok(()),
            Role::Simple => Err(AppError::Forbidden),
        }
    }
}

fn current_session(state: &SharedState, jar: &CookieJar) -> Option<(String, Session)> {
    let id = jar.get(SESSION_COOKIE)?.value().to_string();
    let session = state.sessions.get(&id)?;
    Some((id, session))
}

pub async fn require_session(
    State(state): State<SharedState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match current_session(&state, &jar) {
        Some((session_id, session)) => {
            request
                .extensions_mut()
                .insert(CurrentUser { session_id, session });
            next.run(request).await
        }
        None => AppError::Unauthorized.into_response(),
    }
}

fn session_json(session: &Session) -> Value {
    json!({
        "id": session.user_id,
        "login": session.login,
        "name": session.name,
        "role": session.role,
    })
}

fn user_json(user: &UserRecord) -> Value {
    json!({
        "id": user.id,
        "login": user.login,
        "name": user.name,
        "role": user.role,
    })
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    login: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    remember: bool,
}

pub async fn login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let login = body.login.trim();
    if login.is_empty() || body.password.is_empty() {
        return Err(AppError::bad_request("Login and password are required"));
    }

    let users = state.store.read_users()?;
    let user = users
        .by_login(login)
        .filter(|u| verify_password(&body.password, &u.password_hash))
        .ok_or_else(|| {
            info!("Failed login attempt for '{}'", login);
            AppError::Unauthorized
        })?;

    let lifetime = if body.remember {
        REMEMBER_DURATION
    } else {
        SESSION_DURATION
    };
    let session_id = Uuid::new_v4().to_string();
    let session = Session::for_user(user, lifetime);
    state.sessions.set(session_id.clone(), session.clone());

    let mut cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true);
    if body.remember {
        cookie = cookie.max_age(time::Duration::days(30));
    }

    state.log_action(&session, "login", json!({ "remember": body.remember }));

    let mut reply = session_json(&session);
    reply["ok"] = json!(true);
    Ok((jar.add(cookie), Json(reply)))
}

pub async fn logout(State(state): State<SharedState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(session) = state.sessions.expire(cookie.value()) {
            state.log_action(&session, "logout", Value::Null);
        }
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(json!({ "ok": true })),
    )
}

pub async fn session(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<Json<Value>, AppError> {
    let (_, session) = current_session(&state, &jar).ok_or(AppError::Unauthorized)?;
    Ok(Json(session_json(&session)))
}

pub async fn profile(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let users = state.store.read_users()?;
    let record = users
        .find(user.session.user_id)
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user_json(record)))
}

/// Partial user update. Blank strings count as "leave unchanged".
#[derive(Deserialize, Default)]
pub struct UserUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub async fn update_profile(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UserUpdate>,
) -> Result<Json<Value>, AppError> {
    let mut users = state.store.read_users()?;
    let id = user.session.user_id;

    if let Some(login) = filled(&body.login) {
        if users.login_taken(login, Some(id)) {
            return Err(AppError::Conflict("Login already taken".into()));
        }
    }
    let password_hash = match body.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let record = users
        .find_mut(id)
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if let Some(name) = filled(&body.name) {
        record.name = name.to_string();
    }
    if let Some(login) = filled(&body.login) {
        record.login = login.to_string();
    }
    if let Some(hash) = password_hash {
        record.password_hash = hash;
    }
    let updated = record.clone();
    state.store.write_users(&users)?;

    let mut session = user.session.clone();
    session.login = updated.login.clone();
    session.name = updated.name.clone();
    state.sessions.set(user.session_id.clone(), session.clone());
    state.log_action(&session, "update_profile", Value::Null);

    Ok(Json(user_json(&updated)))
}

pub async fn list_users(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Value>>, AppError> {
    user.require_super()?;
    let users = state.store.read_users()?;
    Ok(Json(users.users.iter().map(user_json).collect()))
}

#[derive(Deserialize)]
pub struct NewUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    login: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: String,
}

pub async fn create_user(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<NewUser>,
) -> Result<Json<Value>, AppError> {
    user.require_super()?;

    let (name, login) = (body.name.trim(), body.login.trim());
    if name.is_empty() || login.is_empty() || body.password.is_empty() {
        return Err(AppError::bad_request("Name, login and password are required"));
    }
    let role = Role::parse(&body.role).ok_or_else(|| AppError::bad_request("Invalid role"))?;

    let mut users = state.store.read_users()?;
    if users.login_taken(login, None) {
        return Err(AppError::Conflict("Login already taken".into()));
    }

    users.last_id += 1;
    let record = UserRecord {
        id: users.last_id,
        name: name.to_string(),
        login: login.to_string(),
        password_hash: hash_password(&body.password)?,
        role,
    };
    users.users.push(record.clone());
    state.store.write_users(&users)?;

    state.log_action(
        &user.session,
        "create_user",
        json!({ "id": record.id, "login": record.login }),
    );
    Ok(Json(user_json(&record)))
}

pub async fn update_user(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Path(raw_id): Path<String>,
    Json(body): Json<UserUpdate>,
) -> Result<Json<Value>, AppError> {
    user.require_super()?;
    let id = parse_id(&raw_id)?;

    let role = match filled(&body.role) {
        Some(role) => Some(Role::parse(role).ok_or_else(|| AppError::bad_request("Invalid role"))?),
        None => None,
    };

    let mut users = state.store.read_users()?;
    if users.find(id).is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }
    if let Some(login) = filled(&body.login) {
        if users.login_taken(login, Some(id)) {
            return Err(AppError::Conflict("Login already taken".into()));
        }
    }
    let password_hash = match body.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let record = users
        .find_mut(id)
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if let Some(name) = filled(&body.name) {
        record.name = name.to_string();
    }
    if let Some(login) = filled(&body.login) {
        record.login = login.to_string();
    }
    if let Some(hash) = password_hash {
        record.password_hash = hash;
    }
    if let Some(role) = role {
        record.role = role;
    }
    let updated = record.clone();
    state.store.write_users(&users)?;

    state.log_action(&user.session, "update_user", json!({ "id": id }));
    Ok(Json(user_json(&updated)))
}

pub async fn delete_user(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    user.require_super()?;
    let id = parse_id(&raw_id)?;
    if id == user.session.user_id {
        return Err(AppError::bad_request("You cannot delete yourself"));
    }

    let mut users = state.store.read_users()?;
    let before = users.users.len();
    users.users.retain(|u| u.id != id);
    if users.users.len() == before {
        return Err(AppError::NotFound("User not found".into()));
    }
    state.store.write_users(&users)?;

    state.log_action(&user.session, "delete_user", json!({ "id": id }));
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_actions(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<ActionEntry>>, AppError> {
    user.require_super()?;
    Ok(Json(state.store.recent_actions(Utc::now())?))
}
