use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Profile endpoints sit behind the auth middleware, unlike register/login.
pub fn profile_router() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub name: String,
    pub role: String,
    pub exp: usize,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn create_token(user_id: &str, email: &str, name: &str, role: &str, secret: &str) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::days(7))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    // Validate input
    if body.email.is_empty() || !body.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if body.full_name.trim().is_empty() {
        return Err(AppError::Validation("Full name is required".to_string()));
    }
    if body.phone.trim().is_empty() {
        return Err(AppError::Validation("Phone number is required".to_string()));
    }
    if body.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if body.password != body.confirm_password {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }

    // Check if user already exists
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&body.email)
        .fetch_one(&state.db.pool)
        .await?;

    if existing > 0 {
        return Err(AppError::Validation(
            "User already exists with this email".to_string(),
        ));
    }

    let password_hash = hash_password(&body.password)?;

    // New accounts always start as researchers; admins are promoted later.
    let role = "researcher";
    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, full_name, email, phone, password_hash, role, active, created_at) VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
    )
    .bind(&user_id)
    .bind(&body.full_name)
    .bind(&body.email)
    .bind(&body.phone)
    .bind(&password_hash)
    .bind(role)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let token = create_token(
        &user_id,
        &body.email,
        &body.full_name,
        role,
        &state.config.jwt_secret,
    )?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse {
            id: user_id,
            full_name: body.full_name,
            email: body.email,
            phone: body.phone,
            role: role.to_string(),
        },
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, (String, String, String, String, String, String, bool)>(
        "SELECT id, full_name, email, phone, password_hash, role, active FROM users WHERE email = ?",
    )
    .bind(&body.email)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    let (user_id, full_name, email, phone, password_hash, role, active) = user;

    if !active {
        return Err(AppError::Unauthorized);
    }

    if !verify_password(&body.password, &password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = create_token(&user_id, &email, &full_name, &role, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse {
            id: user_id,
            full_name,
            email,
            phone,
            role,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserResponse>> {
    let profile = sqlx::query_as::<_, (String, String, String, String, String)>(
        "SELECT id, full_name, email, phone, role FROM users WHERE id = ?",
    )
    .bind(&user.id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (id, full_name, email, phone, role) = profile;

    Ok(Json(UserResponse {
        id,
        full_name,
        email,
        phone,
        role,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    let current = sqlx::query_as::<_, (String, String, String, String, String)>(
        "SELECT full_name, email, phone, password_hash, role FROM users WHERE id = ?",
    )
    .bind(&user.id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (mut full_name, mut email, mut phone, mut password_hash, role) = current;

    if let Some(new_email) = body.email {
        if new_email != email {
            let taken = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE email = ? AND id != ?",
            )
            .bind(&new_email)
            .bind(&user.id)
            .fetch_one(&state.db.pool)
            .await?;

            if taken > 0 {
                return Err(AppError::Validation("Email already in use".to_string()));
            }
            email = new_email;
        }
    }
    if let Some(new_name) = body.full_name {
        if !new_name.trim().is_empty() {
            full_name = new_name;
        }
    }
    if let Some(new_phone) = body.phone {
        if !new_phone.trim().is_empty() {
            phone = new_phone;
        }
    }

    // Changing the password requires re-verifying the current one.
    if let Some(new_password) = body.new_password {
        let current_password = body.current_password.ok_or_else(|| {
            AppError::Validation(
                "Current password is required to set a new password".to_string(),
            )
        })?;

        if !verify_password(&current_password, &password_hash)? {
            return Err(AppError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }
        if new_password.len() < 8 {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        password_hash = hash_password(&new_password)?;
    }

    sqlx::query("UPDATE users SET full_name = ?, email = ?, phone = ?, password_hash = ? WHERE id = ?")
        .bind(&full_name)
        .bind(&email)
        .bind(&phone)
        .bind(&password_hash)
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(UserResponse {
        id: user.id,
        full_name,
        email,
        phone,
        role,
    }))
}
