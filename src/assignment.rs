// src/assignment.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use log::{error, info, warn};
use mongodb::bson::doc;
use mongodb::Database;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::{Task, TaskAssignment};

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignTeamRequest {
    pub team_id: String,
}

/// Inserts one history row. Shared by the inline best-effort write in
/// `assign_task` and the standalone, retriable `record_assignment` endpoint.
pub async fn record_assignment_row(
    db: &Database,
    task_id: &str,
    user_id: &str,
    assigned_by: &str,
) -> mongodb::error::Result<TaskAssignment> {
    let row = TaskAssignment {
        assignment_id: Uuid::new_v4().to_string(),
        task_id: task_id.to_string(),
        user_id: user_id.to_string(),
        assigned_by: assigned_by.to_string(),
        assigned_at: Utc::now(),
    };
    db.collection::<TaskAssignment>("task_assignments")
        .insert_one(&row)
        .await?;
    Ok(row)
}

/// Loads the task and checks the caller may touch it: the task's owner, or a
/// member of the task's team.
async fn load_task_for(
    data: &web::Data<AppState>,
    task_id: &str,
    current_user: &str,
) -> Result<Task, HttpResponse> {
    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    let task = match tasks_coll.find_one(doc! { "task_id": task_id }).await {
        Ok(Some(task)) => task,
        Ok(None) => return Err(HttpResponse::NotFound().body("Task not found")),
        Err(e) => {
            error!("Error fetching task: {}", e);
            return Err(
                HttpResponse::InternalServerError().body(format!("Error fetching task: {}", e))
            );
        }
    };

    if task.user_id == current_user {
        return Ok(task);
    }

    if let Some(team_id) = &task.team_id {
        let members_coll = data
            .mongodb
            .db
            .collection::<mongodb::bson::Document>("team_members");
        if members_coll
            .find_one(doc! { "team_id": team_id, "user_id": current_user })
            .await
            .ok()
            .flatten()
            .is_some()
        {
            return Ok(task);
        }
    }

    Err(HttpResponse::Unauthorized().body("Not allowed to modify this task"))
}

/// POST /tasks/{task_id}/assign
/// Sets `assigned_to`, then records history best-effort: a failed history
/// write is logged and does not fail the assignment.
pub async fn assign_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<AssignTaskRequest>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if let Err(resp) = load_task_for(&data, &task_id, &current_user).await {
        return resp;
    }

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    match tasks_coll
        .update_one(
            doc! { "task_id": &task_id },
            doc! { "$set": {
                "assigned_to": &payload.user_id,
                "updated_at": Utc::now().to_rfc3339(),
            } },
        )
        .await
    {
        Ok(res) if res.matched_count == 0 => return HttpResponse::NotFound().body("Task not found"),
        Ok(_) => {}
        Err(e) => {
            error!("Error assigning task: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error assigning task: {}", e));
        }
    }

    if let Err(e) =
        record_assignment_row(&data.mongodb.db, &task_id, &payload.user_id, &current_user).await
    {
        warn!(
            "Failed to record assignment history for task {}: {}",
            task_id, e
        );
    }

    info!("Task {} assigned to {}", task_id, payload.user_id);
    HttpResponse::Ok().body("Task assigned")
}

/// POST /tasks/{task_id}/unassign
/// Clears `assigned_to`. Idempotent: unassigning an unassigned task succeeds.
pub async fn unassign_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if let Err(resp) = load_task_for(&data, &task_id, &current_user).await {
        return resp;
    }

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    match tasks_coll
        .update_one(
            doc! { "task_id": &task_id },
            doc! { "$set": {
                "assigned_to": null,
                "updated_at": Utc::now().to_rfc3339(),
            } },
        )
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().body("Task not found"),
        Ok(_) => HttpResponse::Ok().body("Task unassigned"),
        Err(e) => {
            error!("Error unassigning task: {}", e);
            HttpResponse::InternalServerError().body(format!("Error unassigning task: {}", e))
        }
    }
}

/// PUT /tasks/{task_id}/team
/// Moves the task into a team without touching `assigned_to`. The caller must
/// be a member of the target team.
pub async fn assign_task_to_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<AssignTeamRequest>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let members_coll = data
        .mongodb
        .db
        .collection::<mongodb::bson::Document>("team_members");
    if members_coll
        .find_one(doc! { "team_id": &payload.team_id, "user_id": &current_user })
        .await
        .ok()
        .flatten()
        .is_none()
    {
        return HttpResponse::Unauthorized().body("Not a member of the team");
    }

    if let Err(resp) = load_task_for(&data, &task_id, &current_user).await {
        return resp;
    }

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    match tasks_coll
        .update_one(
            doc! { "task_id": &task_id },
            doc! { "$set": {
                "team_id": &payload.team_id,
                "updated_at": Utc::now().to_rfc3339(),
            } },
        )
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().body("Task not found"),
        Ok(_) => {
            info!("Task {} moved to team {}", task_id, payload.team_id);
            HttpResponse::Ok().body("Task assigned to team")
        }
        Err(e) => {
            error!("Error assigning task to team: {}", e);
            HttpResponse::InternalServerError()
                .body(format!("Error assigning task to team: {}", e))
        }
    }
}

/// DELETE /tasks/{task_id}/team
/// Clears `team_id` and `assigned_to` together in one update: removing a task
/// from a team always also unassigns it, regardless of who the assignee is.
pub async fn remove_task_from_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if let Err(resp) = load_task_for(&data, &task_id, &current_user).await {
        return resp;
    }

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    match tasks_coll
        .update_one(
            doc! { "task_id": &task_id },
            doc! { "$set": {
                "team_id": null,
                "assigned_to": null,
                "updated_at": Utc::now().to_rfc3339(),
            } },
        )
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().body("Task not found"),
        Ok(_) => HttpResponse::Ok().body("Task removed from team"),
        Err(e) => {
            error!("Error removing task from team: {}", e);
            HttpResponse::InternalServerError()
                .body(format!("Error removing task from team: {}", e))
        }
    }
}

/// POST /tasks/{task_id}/assignments
/// Records one history row on its own. This is the retriable counterpart to
/// the inline best-effort write in assign: when that write fails, the caller
/// can replay it here.
pub async fn record_assignment(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<AssignTaskRequest>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if let Err(resp) = load_task_for(&data, &task_id, &current_user).await {
        return resp;
    }

    match record_assignment_row(&data.mongodb.db, &task_id, &payload.user_id, &current_user).await
    {
        Ok(row) => HttpResponse::Ok().json(row),
        Err(e) => {
            error!("Error recording assignment: {}", e);
            HttpResponse::InternalServerError().body(format!("Error recording assignment: {}", e))
        }
    }
}

/// GET /tasks/{task_id}/assignments
/// Assignment history for a task, newest first.
pub async fn list_assignments(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if let Err(resp) = load_task_for(&data, &task_id, &current_user).await {
        return resp;
    }

    let assignments_coll = data
        .mongodb
        .db
        .collection::<TaskAssignment>("task_assignments");
    let mut cursor = match assignments_coll
        .find(doc! { "task_id": &task_id })
        .sort(doc! { "assigned_at": -1 })
        .await
    {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching assignment history: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching assignment history: {}", e));
        }
    };

    let mut rows: Vec<TaskAssignment> = Vec::new();
    while let Some(row_res) = cursor.next().await {
        match row_res {
            Ok(row) => rows.push(row),
            Err(e) => {
                error!("Error iterating assignment history: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating assignment history: {}", e));
            }
        }
    }

    HttpResponse::Ok().json(rows)
}
