use actix_web::{web, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::error;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Stored user document, including the bcrypt hash. Reads that leave the auth
/// boundary deserialize into `models::Profile`, which has no password field.
#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    user_id: String,
    email: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    password: String,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct SignupInfo {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

// JWT Creation
pub fn create_jwt(user_id: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

// POST /auth/signup
pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupInfo>,
) -> impl Responder {
    if signup_info.email.trim().is_empty() || signup_info.password.is_empty() {
        return HttpResponse::BadRequest().body("Email and password are required");
    }

    let users_collection = data.mongodb.db.collection::<UserRecord>("profiles");

    // Reject duplicate emails up front.
    match users_collection
        .find_one(doc! { "email": &signup_info.email })
        .await
    {
        Ok(Some(_)) => return HttpResponse::Conflict().body("Email already registered"),
        Ok(None) => {}
        Err(e) => {
            error!("Error checking existing email: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error checking existing email: {}", e));
        }
    }

    let hashed_password = match hash(&signup_info.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => return HttpResponse::InternalServerError().body("Error hashing password"),
    };

    let new_user = UserRecord {
        user_id: Uuid::new_v4().to_string(),
        email: signup_info.email.clone(),
        full_name: signup_info.full_name.clone(),
        avatar_url: None,
        password: hashed_password,
        created_at: Utc::now(),
    };

    match users_collection.insert_one(&new_user).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "User created",
            "user_id": new_user.user_id,
        })),
        Err(e) => {
            error!("Error creating user: {}", e);
            HttpResponse::InternalServerError().body(format!("Error creating user: {}", e))
        }
    }
}

// POST /auth/login
pub async fn login(data: web::Data<AppState>, login_info: web::Json<LoginInfo>) -> impl Responder {
    let users_collection = data.mongodb.db.collection::<UserRecord>("profiles");
    let user_doc = users_collection
        .find_one(doc! { "email": &login_info.email })
        .await;

    match user_doc {
        Ok(Some(user)) => {
            if verify(&login_info.password, &user.password).unwrap_or(false) {
                match create_jwt(&user.user_id, &data.config.jwt_secret) {
                    Ok(token) => HttpResponse::Ok().json(
                        serde_json::json!({ "token": token, "user_id": user.user_id }),
                    ),
                    Err(e) => {
                        error!("Error signing token: {}", e);
                        HttpResponse::InternalServerError().body("Error signing token")
                    }
                }
            } else {
                HttpResponse::Unauthorized().body("Invalid credentials")
            }
        }
        Ok(None) => HttpResponse::Unauthorized().body("Invalid credentials"),
        Err(e) => {
            error!("Error logging in: {}", e);
            HttpResponse::InternalServerError().body("Error logging in")
        }
    }
}
