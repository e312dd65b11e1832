// src/invite.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use log::{error, info, warn};
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::membership::{current_role, is_owner_or_admin, load_members};
use crate::models::{Team, TeamMember, TeamRole};

const INVITE_CODE_LEN: usize = 10;
const INVITE_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many fresh codes to try when the unique index reports a collision.
const INVITE_CODE_ATTEMPTS: usize = 3;

/// Opaque shared token: 10 characters drawn uniformly from A-Z0-9.
pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CODE_CHARSET[rng.gen_range(0..INVITE_CODE_CHARSET.len())] as char)
        .collect()
}

fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_err)) if write_err.code == 11000
    )
}

#[derive(Debug, Serialize)]
pub struct TeamPreview {
    pub team_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<Team> for TeamPreview {
    fn from(team: Team) -> Self {
        TeamPreview {
            team_id: team.team_id,
            name: team.name,
            description: team.description,
            created_at: team.created_at,
        }
    }
}

/// POST /teams/{team_id}/invite
/// Rotates the team's invite code. Owner or admin only. Prior links become
/// permanently invalid; there is no grace period.
pub async fn regenerate_invite_code(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> impl Responder {
    let team_id = team_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let members = match load_members(&data.mongodb.db, &team_id).await {
        Ok(members) => members,
        Err(e) => {
            error!("Error checking membership: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error checking membership: {}", e));
        }
    };
    if !is_owner_or_admin(&current_user, &members) {
        return HttpResponse::Unauthorized()
            .body("Only team owners or admins can regenerate the invite code");
    }

    let teams_coll = data.mongodb.db.collection::<Team>("teams");
    for attempt in 1..=INVITE_CODE_ATTEMPTS {
        let code = generate_invite_code();
        let update = doc! { "$set": {
            "invite_code": &code,
            "updated_at": Utc::now().to_rfc3339(),
        } };
        match teams_coll
            .update_one(doc! { "team_id": &team_id }, update)
            .await
        {
            Ok(res) if res.matched_count == 0 => {
                return HttpResponse::NotFound().body("Team not found")
            }
            Ok(_) => {
                info!("Regenerated invite code for team {}", team_id);
                return HttpResponse::Ok().json(serde_json::json!({ "invite_code": code }));
            }
            Err(e) if is_duplicate_key_error(&e) && attempt < INVITE_CODE_ATTEMPTS => {
                warn!("Invite code collision for team {}, retrying", team_id);
            }
            Err(e) => {
                error!("Error regenerating invite code: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error regenerating invite code: {}", e));
            }
        }
    }

    HttpResponse::InternalServerError().body("Error regenerating invite code")
}

/// GET /teams/{team_id}/invite
/// The shareable invite link for the team's current code. Members only.
pub async fn get_invite_link(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> impl Responder {
    let team_id = team_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let members = match load_members(&data.mongodb.db, &team_id).await {
        Ok(members) => members,
        Err(e) => {
            error!("Error checking membership: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error checking membership: {}", e));
        }
    };
    if current_role(&current_user, &members).is_none() {
        return HttpResponse::Unauthorized().body("Not a member of the team");
    }

    let teams_coll = data.mongodb.db.collection::<Team>("teams");
    match teams_coll.find_one(doc! { "team_id": &team_id }).await {
        Ok(Some(team)) => HttpResponse::Ok().json(serde_json::json!({
            "invite_link": data.config.invite_link(&team.invite_code),
            "team_name": team.name,
        })),
        Ok(None) => HttpResponse::NotFound().body("Team not found"),
        Err(e) => {
            error!("Error fetching team: {}", e);
            HttpResponse::InternalServerError().body(format!("Error fetching team: {}", e))
        }
    }
}

/// GET /teams/join/{invite_code}
/// Resolves a code to a team preview for the join page.
pub async fn resolve_invite_code(
    data: web::Data<AppState>,
    invite_code: web::Path<String>,
) -> impl Responder {
    let teams_coll = data.mongodb.db.collection::<Team>("teams");
    match teams_coll
        .find_one(doc! { "invite_code": &*invite_code })
        .await
    {
        Ok(Some(team)) => HttpResponse::Ok().json(TeamPreview::from(team)),
        Ok(None) => HttpResponse::NotFound().body("Invalid or expired invite link"),
        Err(e) => {
            error!("Error fetching team preview: {}", e);
            HttpResponse::InternalServerError().body(format!("Error fetching team preview: {}", e))
        }
    }
}

/// POST /teams/join/{invite_code}
/// Joins the authenticated user to the team behind the code as a member.
pub async fn join_by_invite_code(
    req: HttpRequest,
    data: web::Data<AppState>,
    invite_code: web::Path<String>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    // 1) Resolve the code.
    let teams_coll = data.mongodb.db.collection::<Team>("teams");
    let team = match teams_coll
        .find_one(doc! { "invite_code": &*invite_code })
        .await
    {
        Ok(Some(team)) => team,
        Ok(None) => return HttpResponse::NotFound().body("Invalid invite code"),
        Err(e) => {
            error!("Error resolving invite code: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error resolving invite code: {}", e));
        }
    };

    // 2) Reject duplicates.
    let members_coll = data.mongodb.db.collection::<TeamMember>("team_members");
    match members_coll
        .find_one(doc! { "team_id": &team.team_id, "user_id": &current_user })
        .await
    {
        Ok(Some(_)) => {
            return HttpResponse::Conflict().body("You are already a member of this team")
        }
        Ok(None) => {}
        Err(e) => {
            error!("Error checking membership: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error checking membership: {}", e));
        }
    }

    // 3) Add as member.
    let new_member = TeamMember {
        member_id: Uuid::new_v4().to_string(),
        team_id: team.team_id.clone(),
        user_id: current_user.clone(),
        role: TeamRole::Member,
        joined_at: Utc::now(),
    };
    match members_coll.insert_one(&new_member).await {
        Ok(_) => {
            info!("User {} joined team {} by invite", current_user, team.team_id);
            HttpResponse::Ok().json(TeamPreview::from(team))
        }
        Err(e) => {
            error!("Error joining team: {}", e);
            HttpResponse::InternalServerError().body(format!("Error joining team: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_codes_are_ten_uppercase_base36_chars() {
        for _ in 0..50 {
            let code = generate_invite_code();
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| INVITE_CODE_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn invite_link_embeds_origin_and_code() {
        let config = crate::config::Config {
            mongo_uri: String::new(),
            database_name: String::new(),
            jwt_secret: String::new(),
            frontend_origin: "https://app.example.com".to_string(),
        };
        assert_eq!(
            config.invite_link("AB12CD34EF"),
            "https://app.example.com/teams/join/AB12CD34EF"
        );
    }
}
