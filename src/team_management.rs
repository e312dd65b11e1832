// src/team_management.rs

use std::collections::HashMap;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::invite::generate_invite_code;
use crate::membership::{attach_profiles, current_role, load_members, load_profiles, MemberWithProfile};
use crate::models::{Team, TeamMember, TeamRole};

// ─── REQUEST PAYLOADS ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

// ─── RESPONSE SHAPES ───────────────────────────────────────────────────────────

/// A team flattened together with the caller's own membership row.
#[derive(Debug, Serialize)]
pub struct UserTeamEntry {
    #[serde(flatten)]
    pub team: Team,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<MemberWithProfile>,
}

/// Flattens membership rows against their teams, keeping membership order.
/// Memberships whose team is missing are dropped.
pub fn merge_user_teams(
    memberships: Vec<TeamMember>,
    teams: &HashMap<String, Team>,
) -> Vec<UserTeamEntry> {
    memberships
        .into_iter()
        .filter_map(|m| {
            teams.get(&m.team_id).map(|team| UserTeamEntry {
                team: team.clone(),
                role: m.role,
                joined_at: m.joined_at,
            })
        })
        .collect()
}

// ─── ENDPOINTS ─────────────────────────────────────────────────────────────────

/// POST /teams
/// Creates a team and the creator's owner membership. If the membership
/// insert fails the team row is deleted again, so the pair either exists
/// together or not at all from the caller's perspective.
pub async fn create_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_info: web::Json<CreateTeamRequest>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if team_info.name.trim().is_empty() {
        return HttpResponse::BadRequest().body("Team name is required");
    }

    let teams_coll = data.mongodb.db.collection::<Team>("teams");
    let members_coll = data.mongodb.db.collection::<TeamMember>("team_members");

    let new_team = Team {
        team_id: Uuid::new_v4().to_string(),
        name: team_info.name.clone(),
        description: team_info.description.clone(),
        owner_id: current_user.clone(),
        invite_code: generate_invite_code(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    if let Err(e) = teams_coll.insert_one(&new_team).await {
        error!("Error creating team: {}", e);
        return HttpResponse::InternalServerError().body(format!("Error creating team: {}", e));
    }

    let owner_membership = TeamMember {
        member_id: Uuid::new_v4().to_string(),
        team_id: new_team.team_id.clone(),
        user_id: current_user,
        role: TeamRole::Owner,
        joined_at: Utc::now(),
    };

    if let Err(e) = members_coll.insert_one(&owner_membership).await {
        error!("Error assigning team owner: {}", e);
        // Compensating delete so a team never exists without its owner row.
        if let Err(del_err) = teams_coll
            .delete_one(doc! { "team_id": &new_team.team_id })
            .await
        {
            error!("Error rolling back team {}: {}", new_team.team_id, del_err);
        }
        return HttpResponse::InternalServerError()
            .body(format!("Error assigning team owner: {}", e));
    }

    info!("Team created: {}", new_team.team_id);
    HttpResponse::Ok().json(new_team)
}

/// GET /teams
/// Teams the authenticated user belongs to, enriched with the caller's role
/// and join time, most recently joined first.
pub async fn get_user_teams(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let members_coll = data.mongodb.db.collection::<TeamMember>("team_members");
    let mut cursor = match members_coll
        .find(doc! { "user_id": &current_user })
        .sort(doc! { "joined_at": -1 })
        .await
    {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching teams: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error fetching teams: {}", e));
        }
    };

    let mut memberships: Vec<TeamMember> = Vec::new();
    while let Some(member_res) = cursor.next().await {
        match member_res {
            Ok(member) => memberships.push(member),
            Err(e) => {
                error!("Error iterating teams: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating teams: {}", e));
            }
        }
    }

    let team_ids: Vec<String> = memberships.iter().map(|m| m.team_id.clone()).collect();
    let mut teams: HashMap<String, Team> = HashMap::new();
    if !team_ids.is_empty() {
        let teams_coll = data.mongodb.db.collection::<Team>("teams");
        let mut cursor = match teams_coll
            .find(doc! { "team_id": { "$in": team_ids } })
            .await
        {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("Error fetching teams: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error fetching teams: {}", e));
            }
        };
        while let Some(team_res) = cursor.next().await {
            match team_res {
                Ok(team) => {
                    teams.insert(team.team_id.clone(), team);
                }
                Err(e) => {
                    error!("Error iterating teams: {}", e);
                    return HttpResponse::InternalServerError()
                        .body(format!("Error iterating teams: {}", e));
                }
            }
        }
    }

    HttpResponse::Ok().json(merge_user_teams(memberships, &teams))
}

/// GET /teams/{team_id}
/// Team details with the full member roster. Members only.
pub async fn get_team(
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
    let team = match teams_coll.find_one(doc! { "team_id": &team_id }).await {
        Ok(Some(team)) => team,
        Ok(None) => return HttpResponse::NotFound().body("Team not found"),
        Err(e) => {
            error!("Error fetching team: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error fetching team: {}", e));
        }
    };

    let user_ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
    let profiles = match load_profiles(&data.mongodb.db, user_ids).await {
        Ok(profiles) => profiles,
        Err(e) => {
            error!("Error fetching member profiles: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching member profiles: {}", e));
        }
    };

    HttpResponse::Ok().json(TeamDetail {
        team,
        members: attach_profiles(members, &profiles),
    })
}

/// PUT /teams/{team_id}
/// Updates team name and/or description. Owner only.
pub async fn update_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
    team_info: web::Json<UpdateTeamRequest>,
) -> impl Responder {
    let team_id = team_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let teams_coll = data.mongodb.db.collection::<Team>("teams");
    let filter = doc! { "team_id": &team_id };
    let team = match teams_coll.find_one(filter.clone()).await {
        Ok(Some(team)) => team,
        Ok(None) => return HttpResponse::NotFound().body("Team not found"),
        Err(e) => {
            error!("Error fetching team: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error fetching team: {}", e));
        }
    };
    if team.owner_id != current_user {
        return HttpResponse::Unauthorized().body("Only team owner can update team");
    }

    let mut set_doc = doc! {};
    if let Some(name) = &team_info.name {
        if name.trim().is_empty() {
            return HttpResponse::BadRequest().body("Team name is required");
        }
        set_doc.insert("name", name);
    }
    if let Some(description) = &team_info.description {
        set_doc.insert("description", description);
    }
    if set_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }
    set_doc.insert("updated_at", Utc::now().to_rfc3339());

    match teams_coll
        .update_one(filter.clone(), doc! { "$set": set_doc })
        .await
    {
        Ok(_) => match teams_coll.find_one(filter).await {
            Ok(Some(team)) => HttpResponse::Ok().json(team),
            Ok(None) => HttpResponse::NotFound().body("Team not found"),
            Err(e) => {
                error!("Error reloading team: {}", e);
                HttpResponse::InternalServerError().body(format!("Error reloading team: {}", e))
            }
        },
        Err(e) => {
            error!("Error updating team: {}", e);
            HttpResponse::InternalServerError().body(format!("Error updating team: {}", e))
        }
    }
}

/// DELETE /teams/{team_id}
/// Deletes a team, its membership rows, and detaches its tasks. Owner only.
pub async fn delete_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> impl Responder {
    let team_id = team_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let teams_coll = data.mongodb.db.collection::<Team>("teams");
    let filter = doc! { "team_id": &team_id };
    let team = match teams_coll.find_one(filter.clone()).await {
        Ok(Some(team)) => team,
        Ok(None) => return HttpResponse::NotFound().body("Team not found"),
        Err(e) => {
            error!("Error fetching team: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error fetching team: {}", e));
        }
    };
    if team.owner_id != current_user {
        return HttpResponse::Unauthorized().body("Only team owner can delete team");
    }

    match teams_coll.delete_one(filter).await {
        Ok(_) => {
            let members_coll = data
                .mongodb
                .db
                .collection::<mongodb::bson::Document>("team_members");
            if let Err(e) = members_coll
                .delete_many(doc! { "team_id": &team_id })
                .await
            {
                warn!("Failed to clean up memberships for team {}: {}", team_id, e);
            }

            // Detach the team's tasks; removing from a team also unassigns.
            let tasks_coll = data
                .mongodb
                .db
                .collection::<mongodb::bson::Document>("tasks");
            if let Err(e) = tasks_coll
                .update_many(
                    doc! { "team_id": &team_id },
                    doc! { "$set": { "team_id": null, "assigned_to": null } },
                )
                .await
            {
                warn!("Failed to detach tasks for team {}: {}", team_id, e);
            }

            info!("Team deleted: {}", team_id);
            HttpResponse::Ok().body("Team deleted successfully")
        }
        Err(e) => {
            error!("Error deleting team: {}", e);
            HttpResponse::InternalServerError().body(format!("Error deleting team: {}", e))
        }
    }
}

/// POST /teams/{team_id}/leave
/// Removes exactly the caller's own membership row.
pub async fn leave_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> impl Responder {
    let team_id = team_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let members_coll = data.mongodb.db.collection::<TeamMember>("team_members");
    match members_coll
        .delete_one(doc! { "team_id": &team_id, "user_id": &current_user })
        .await
    {
        Ok(res) if res.deleted_count == 0 => {
            HttpResponse::NotFound().body("Not a member of this team")
        }
        Ok(_) => {
            info!("User {} left team {}", current_user, team_id);
            HttpResponse::Ok().body("Left team")
        }
        Err(e) => {
            error!("Error leaving team: {}", e);
            HttpResponse::InternalServerError().body(format!("Error leaving team: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(team_id: &str, name: &str) -> Team {
        Team {
            team_id: team_id.to_string(),
            name: name.to_string(),
            description: None,
            owner_id: "owner".to_string(),
            invite_code: "AAAA000000".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn membership(team_id: &str, role: TeamRole) -> TeamMember {
        TeamMember {
            member_id: format!("m-{}", team_id),
            team_id: team_id.to_string(),
            user_id: "u1".to_string(),
            role,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn merge_keeps_membership_order_and_roles() {
        let memberships = vec![
            membership("t2", TeamRole::Member),
            membership("t1", TeamRole::Owner),
        ];
        let teams: HashMap<String, Team> = [
            ("t1".to_string(), team("t1", "Alpha")),
            ("t2".to_string(), team("t2", "Beta")),
        ]
        .into_iter()
        .collect();

        let entries = merge_user_teams(memberships, &teams);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].team.name, "Beta");
        assert_eq!(entries[0].role, TeamRole::Member);
        assert_eq!(entries[1].team.name, "Alpha");
        assert_eq!(entries[1].role, TeamRole::Owner);
    }

    #[test]
    fn merge_drops_memberships_without_a_team() {
        let memberships = vec![membership("gone", TeamRole::Member)];
        let teams = HashMap::new();
        assert!(merge_user_teams(memberships, &teams).is_empty());
    }
}
