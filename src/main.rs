// src/main.rs

mod app_state;
mod assignment;
mod auth;
mod config;
mod dashboard;
mod db;
mod invite;
mod membership;
mod models;
mod task;
mod team_management;
mod user_management;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;

use crate::app_state::AppState;
use crate::assignment::{
    assign_task, assign_task_to_team, list_assignments, record_assignment, remove_task_from_team,
    unassign_task,
};
use crate::auth::{login, signup};
use crate::dashboard::team_dashboard;
use crate::invite::{
    get_invite_link, join_by_invite_code, regenerate_invite_code, resolve_invite_code,
};
use crate::membership::{get_team_members, remove_team_member, update_member_role};
use crate::task::{
    assigned_tasks, create_task, delete_task, detailed_tasks, list_tasks, task_stats, team_tasks,
    update_task,
};
use crate::team_management::{
    create_team, delete_team, get_team, get_user_teams, leave_team, update_team,
};
use crate::user_management::{find_user_email, get_user_by_id};

#[derive(Debug)]
pub struct Authentication {
    secret: String,
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = futures_util::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        futures_util::future::ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    match verify_token(&token, &self.secret) {
                        Ok(user_id) => {
                            // Insert user_id as a string extension
                            req.extensions_mut().insert(user_id);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

fn verify_token(token: &str, secret: &str) -> Result<String, String> {
    match auth::validate_jwt(token, secret) {
        Ok(claims) => Ok(claims.sub),
        Err(e) => Err(format!("Token decode error: {}", e)),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);

    let frontend_origin = config.frontend_origin.clone();
    let jwt_secret = config.jwt_secret.clone();

    println!("Server running at http://0.0.0.0:8080");
    println!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication {
                secret: jwt_secret.clone(),
            })
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login)),
            )
            // TASKS
            .service(
                web::scope("/tasks")
                    .route("", web::post().to(create_task))
                    .route("", web::get().to(list_tasks))
                    .route("/stats", web::get().to(task_stats))
                    .route("/assigned", web::get().to(assigned_tasks))
                    .route("/detailed", web::get().to(detailed_tasks))
                    .service(
                        web::scope("/{task_id}")
                            .route("", web::put().to(update_task))
                            .route("", web::delete().to(delete_task))
                            .route("/assign", web::post().to(assign_task))
                            .route("/unassign", web::post().to(unassign_task))
                            .route("/team", web::put().to(assign_task_to_team))
                            .route("/team", web::delete().to(remove_task_from_team))
                            .route("/assignments", web::get().to(list_assignments))
                            .route("/assignments", web::post().to(record_assignment)),
                    ),
            )
            // TEAMS
            .service(
                web::scope("/teams")
                    .route("", web::post().to(create_team))
                    .route("", web::get().to(get_user_teams))
                    .route("/join/{invite_code}", web::get().to(resolve_invite_code))
                    .route("/join/{invite_code}", web::post().to(join_by_invite_code))
                    .service(
                        web::scope("/{team_id}")
                            .route("", web::get().to(get_team))
                            .route("", web::put().to(update_team))
                            .route("", web::delete().to(delete_team))
                            .route("/leave", web::post().to(leave_team))
                            .route("/tasks", web::get().to(team_tasks))
                            .route("/dashboard", web::get().to(team_dashboard))
                            .route("/invite", web::post().to(regenerate_invite_code))
                            .route("/invite", web::get().to(get_invite_link))
                            .service(
                                web::scope("/members")
                                    .route("", web::get().to(get_team_members))
                                    .route("", web::delete().to(remove_team_member))
                                    .route("/role", web::put().to(update_member_role)),
                            ),
                    ),
            )
            // USERS
            .service(
                web::scope("/users")
                    .route("/find", web::get().to(find_user_email))
                    .route("/{user_id}", web::get().to(get_user_by_id)),
            )
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}
