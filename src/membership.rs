// src/membership.rs

use std::collections::HashMap;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use mongodb::Database;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::{Profile, TeamMember, TeamRole};

// ─── JOINED SHAPES ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberProfile {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Membership row plus display metadata. The profile is resolved once at the
/// data-access boundary; `None` means the profile row is missing, never an
/// alternate shape.
#[derive(Debug, Clone, Serialize)]
pub struct MemberWithProfile {
    #[serde(flatten)]
    pub member: TeamMember,
    pub profile: Option<MemberProfile>,
}

// ─── REQUEST PAYLOADS ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub user_id: String,
    pub role: TeamRole,
}

// ─── ROLE PREDICATES ───────────────────────────────────────────────────────────
// Pure functions over an already-fetched member list; they never query.

pub fn current_role(user_id: &str, members: &[TeamMember]) -> Option<TeamRole> {
    members
        .iter()
        .find(|m| m.user_id == user_id)
        .map(|m| m.role)
}

pub fn is_owner_or_admin(user_id: &str, members: &[TeamMember]) -> bool {
    matches!(
        current_role(user_id, members),
        Some(TeamRole::Owner) | Some(TeamRole::Admin)
    )
}

// ─── LOADERS ───────────────────────────────────────────────────────────────────

/// All membership rows for a team, oldest join first.
pub async fn load_members(
    db: &Database,
    team_id: &str,
) -> mongodb::error::Result<Vec<TeamMember>> {
    let members_coll = db.collection::<TeamMember>("team_members");
    let mut cursor = members_coll
        .find(doc! { "team_id": team_id })
        .sort(doc! { "joined_at": 1 })
        .await?;

    let mut members = Vec::new();
    while let Some(member) = cursor.next().await {
        members.push(member?);
    }
    Ok(members)
}

pub async fn load_profiles(
    db: &Database,
    user_ids: Vec<String>,
) -> mongodb::error::Result<Vec<Profile>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let profiles_coll = db.collection::<Profile>("profiles");
    let mut cursor = profiles_coll
        .find(doc! { "user_id": { "$in": user_ids } })
        .await?;

    let mut profiles = Vec::new();
    while let Some(profile) = cursor.next().await {
        profiles.push(profile?);
    }
    Ok(profiles)
}

/// In-memory join of membership rows with their profiles. Member order is
/// preserved; a member without a profile row keeps `profile: None`.
pub fn attach_profiles(members: Vec<TeamMember>, profiles: &[Profile]) -> Vec<MemberWithProfile> {
    let by_id: HashMap<&str, &Profile> =
        profiles.iter().map(|p| (p.user_id.as_str(), p)).collect();

    members
        .into_iter()
        .map(|member| {
            let profile = by_id.get(member.user_id.as_str()).map(|p| MemberProfile {
                full_name: p.full_name.clone(),
                avatar_url: p.avatar_url.clone(),
            });
            MemberWithProfile { member, profile }
        })
        .collect()
}

/// The two-query member listing: one fetch for memberships, one `$in` fetch
/// for profiles, merged by user id in memory.
pub async fn members_with_profiles(
    db: &Database,
    team_id: &str,
) -> mongodb::error::Result<Vec<MemberWithProfile>> {
    let members = load_members(db, team_id).await?;
    let user_ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
    let profiles = load_profiles(db, user_ids).await?;
    Ok(attach_profiles(members, &profiles))
}

// ─── ENDPOINTS ─────────────────────────────────────────────────────────────────

/// GET /teams/{team_id}/members
/// Members with profile details, oldest join first. Members only.
pub async fn get_team_members(
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
            error!("Error fetching team members: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching team members: {}", e));
        }
    };

    if current_role(&current_user, &members).is_none() {
        return HttpResponse::Unauthorized().body("Not a member of the team");
    }

    let user_ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
    let profiles = match load_profiles(&data.mongodb.db, user_ids).await {
        Ok(profiles) => profiles,
        Err(e) => {
            error!("Error fetching member profiles: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching member profiles: {}", e));
        }
    };

    HttpResponse::Ok().json(attach_profiles(members, &profiles))
}

/// DELETE /teams/{team_id}/members
/// Removes a member. Owner or admin only.
pub async fn remove_team_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
    payload: web::Json<RemoveMemberRequest>,
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
        return HttpResponse::Unauthorized().body("Only team owners or admins can remove members");
    }

    let members_coll = data.mongodb.db.collection::<TeamMember>("team_members");
    match members_coll
        .delete_one(doc! { "team_id": &team_id, "user_id": &payload.user_id })
        .await
    {
        Ok(res) if res.deleted_count == 0 => {
            HttpResponse::NotFound().body("Member not found in team")
        }
        Ok(_) => {
            info!("Removed {} from team {}", payload.user_id, team_id);
            HttpResponse::Ok().body("Member removed successfully")
        }
        Err(e) => {
            error!("Error removing member: {}", e);
            HttpResponse::InternalServerError().body(format!("Error removing member: {}", e))
        }
    }
}

/// PUT /teams/{team_id}/members/role
/// Changes a member's role. Owner or admin only. Promoting a member to owner
/// transfers ownership: the previous owner is demoted to admin and the team's
/// owner_id is rewritten, keeping exactly one owner per team.
pub async fn update_member_role(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
    payload: web::Json<UpdateRoleRequest>,
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
        return HttpResponse::Unauthorized().body("Only team owners or admins can change roles");
    }
    if current_role(&payload.user_id, &members).is_none() {
        return HttpResponse::NotFound().body("Member not found in team");
    }

    let members_coll = data.mongodb.db.collection::<TeamMember>("team_members");

    if payload.role == TeamRole::Owner {
        // Ownership transfer: demote the current owner before promoting.
        if let Some(previous_owner) = members.iter().find(|m| m.role == TeamRole::Owner) {
            if previous_owner.user_id == payload.user_id {
                return HttpResponse::Ok().body("Member role updated");
            }
            if let Err(e) = members_coll
                .update_one(
                    doc! { "team_id": &team_id, "user_id": &previous_owner.user_id },
                    doc! { "$set": { "role": TeamRole::Admin.as_str() } },
                )
                .await
            {
                error!("Error demoting previous owner: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error demoting previous owner: {}", e));
            }
        }

        let teams_coll = data
            .mongodb
            .db
            .collection::<mongodb::bson::Document>("teams");
        if let Err(e) = teams_coll
            .update_one(
                doc! { "team_id": &team_id },
                doc! { "$set": { "owner_id": &payload.user_id } },
            )
            .await
        {
            error!("Error transferring team ownership: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error transferring team ownership: {}", e));
        }
    }

    match members_coll
        .update_one(
            doc! { "team_id": &team_id, "user_id": &payload.user_id },
            doc! { "$set": { "role": payload.role.as_str() } },
        )
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().body("Member not found in team"),
        Ok(_) => {
            info!(
                "Set role of {} in team {} to {}",
                payload.user_id,
                team_id,
                payload.role.as_str()
            );
            HttpResponse::Ok().body("Member role updated")
        }
        Err(e) => {
            error!("Error updating member role: {}", e);
            HttpResponse::InternalServerError().body(format!("Error updating member role: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(user_id: &str, role: TeamRole) -> TeamMember {
        TeamMember {
            member_id: format!("m-{}", user_id),
            team_id: "t1".to_string(),
            user_id: user_id.to_string(),
            role,
            joined_at: Utc::now(),
        }
    }

    fn profile(user_id: &str, full_name: Option<&str>) -> Profile {
        Profile {
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
            full_name: full_name.map(str::to_string),
            avatar_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn current_role_finds_the_callers_row() {
        let members = vec![member("a", TeamRole::Owner), member("b", TeamRole::Guest)];
        assert_eq!(current_role("a", &members), Some(TeamRole::Owner));
        assert_eq!(current_role("b", &members), Some(TeamRole::Guest));
        assert_eq!(current_role("c", &members), None);
    }

    #[test]
    fn owner_and_admin_pass_the_predicate_others_fail() {
        let members = vec![
            member("owner", TeamRole::Owner),
            member("admin", TeamRole::Admin),
            member("member", TeamRole::Member),
            member("guest", TeamRole::Guest),
        ];
        assert!(is_owner_or_admin("owner", &members));
        assert!(is_owner_or_admin("admin", &members));
        assert!(!is_owner_or_admin("member", &members));
        assert!(!is_owner_or_admin("guest", &members));
        assert!(!is_owner_or_admin("stranger", &members));
    }

    #[test]
    fn attach_profiles_preserves_order_and_tolerates_missing_rows() {
        let members = vec![member("a", TeamRole::Owner), member("b", TeamRole::Member)];
        let profiles = vec![profile("b", Some("Bea"))];

        let joined = attach_profiles(members, &profiles);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].member.user_id, "a");
        assert!(joined[0].profile.is_none());
        assert_eq!(
            joined[1].profile,
            Some(MemberProfile {
                full_name: Some("Bea".to_string()),
                avatar_url: None,
            })
        );
    }
}
