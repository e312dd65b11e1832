use actix_web::{web, HttpResponse, Responder};
use futures_util::StreamExt;
use mongodb::bson::doc;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::models::Profile;

#[derive(Debug, Deserialize)]
pub struct FindUserQuery {
    pub query: String,
}

/// GET /users/find?query=
/// Case-insensitive email search, used by assignee pickers.
pub async fn find_user_email(
    query: web::Query<FindUserQuery>,
    data: web::Data<AppState>,
) -> impl Responder {
    let users_collection = data.mongodb.db.collection::<Profile>("profiles");
    let filter = doc! { "email": { "$regex": &query.query, "$options": "i" } };

    let mut cursor = match users_collection.find(filter).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching users: {}", err))
        }
    };

    let mut users: Vec<Profile> = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(user) => users.push(user),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating users: {}", err))
            }
        }
    }

    HttpResponse::Ok().json(users)
}

/// GET /users/{user_id}
pub async fn get_user_by_id(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> impl Responder {
    let users_collection = data.mongodb.db.collection::<Profile>("profiles");
    let user_id = path.into_inner();
    match users_collection.find_one(doc! { "user_id": &user_id }).await {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => HttpResponse::NotFound().body("User not found"),
        Err(e) => HttpResponse::InternalServerError().body(format!("Error fetching user: {}", e)),
    }
}
