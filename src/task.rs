// src/task.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{NaiveDate, Utc};
use futures_util::StreamExt;
use log::{error, info, warn};
use mongodb::bson::doc;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::dashboard::enrich_with_relations;
use crate::models::task::{CreateTaskRequest, UpdateTaskRequest};
use crate::models::{Task, TaskAssignment, TaskPriority, TaskStatus};

#[derive(Debug, serde::Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub today: usize,
    pub upcoming: usize,
    pub done: usize,
}

/// Personal dashboard counters. "Due today" compares calendar dates only;
/// tasks without a due date never count.
pub fn owner_task_stats(tasks: &[Task], today: NaiveDate) -> TaskStats {
    TaskStats {
        total: tasks.len(),
        today: tasks
            .iter()
            .filter(|t| t.due_date.map(|d| d.date_naive()) == Some(today))
            .count(),
        upcoming: tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Upcoming)
            .count(),
        done: tasks.iter().filter(|t| t.status == TaskStatus::Done).count(),
    }
}

/// POST /tasks
/// Creates a personal task owned by the authenticated user.
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateTaskRequest>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if payload.title.trim().is_empty() {
        return HttpResponse::BadRequest().body("Title is required");
    }

    let new_task = Task {
        task_id: Uuid::new_v4().to_string(),
        user_id: current_user,
        title: payload.title.clone(),
        description: payload.description.clone(),
        status: payload.status.unwrap_or(TaskStatus::Todo),
        priority: payload.priority.unwrap_or(TaskPriority::Medium),
        due_date: payload.due_date,
        team_id: payload.team_id.clone(),
        assigned_to: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    match tasks_coll.insert_one(&new_task).await {
        Ok(_) => {
            info!("Task created: {}", new_task.task_id);
            HttpResponse::Ok().json(&new_task)
        }
        Err(e) => {
            error!("Error creating task: {}", e);
            HttpResponse::InternalServerError().body(format!("Error creating task: {}", e))
        }
    }
}

/// GET /tasks?status=
/// Lists the authenticated user's own tasks, newest first.
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskListQuery>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let mut filter = doc! { "user_id": &current_user };
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }

    fetch_tasks(&data, filter).await
}

/// GET /tasks/assigned
/// Lists tasks assigned to the authenticated user, newest first.
pub async fn assigned_tasks(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    fetch_tasks(&data, doc! { "assigned_to": &current_user }).await
}

/// GET /teams/{team_id}/tasks
/// Lists a team's tasks, newest first. Members only.
pub async fn team_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> impl Responder {
    let team_id = team_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let members_coll = data
        .mongodb
        .db
        .collection::<mongodb::bson::Document>("team_members");
    if members_coll
        .find_one(doc! { "team_id": &team_id, "user_id": &current_user })
        .await
        .ok()
        .flatten()
        .is_none()
    {
        return HttpResponse::Unauthorized().body("Not a member of the team");
    }

    fetch_tasks(&data, doc! { "team_id": &team_id }).await
}

async fn fetch_tasks(data: &web::Data<AppState>, filter: mongodb::bson::Document) -> HttpResponse {
    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    let mut cursor = match tasks_coll
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await
    {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching tasks: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error fetching tasks: {}", e));
        }
    };

    let mut tasks: Vec<Task> = Vec::new();
    while let Some(task_res) = cursor.next().await {
        match task_res {
            Ok(task) => tasks.push(task),
            Err(e) => {
                error!("Error iterating tasks: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating tasks: {}", e));
            }
        }
    }

    HttpResponse::Ok().json(tasks)
}

/// GET /tasks/detailed
/// The user's tasks paired with assignee and team metadata, resolved in two
/// bulk queries rather than one lookup per task.
pub async fn detailed_tasks(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    let mut cursor = match tasks_coll
        .find(doc! { "user_id": &current_user })
        .sort(doc! { "created_at": -1 })
        .await
    {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching tasks: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error fetching tasks: {}", e));
        }
    };

    let mut tasks: Vec<Task> = Vec::new();
    while let Some(task_res) = cursor.next().await {
        match task_res {
            Ok(task) => tasks.push(task),
            Err(e) => {
                error!("Error iterating tasks: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating tasks: {}", e));
            }
        }
    }

    match enrich_with_relations(&data.mongodb.db, tasks).await {
        Ok(detailed) => HttpResponse::Ok().json(detailed),
        Err(e) => {
            error!("Error resolving task relations: {}", e);
            HttpResponse::InternalServerError().body(format!("Error resolving task relations: {}", e))
        }
    }
}

/// GET /tasks/stats
pub async fn task_stats(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    let mut cursor = match tasks_coll.find(doc! { "user_id": &current_user }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching tasks: {}", e);
            return HttpResponse::InternalServerError().body(format!("Error fetching tasks: {}", e));
        }
    };

    let mut tasks: Vec<Task> = Vec::new();
    while let Some(task_res) = cursor.next().await {
        match task_res {
            Ok(task) => tasks.push(task),
            Err(e) => {
                error!("Error iterating tasks: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating tasks: {}", e));
            }
        }
    }

    HttpResponse::Ok().json(owner_task_stats(&tasks, Utc::now().date_naive()))
}

/// PUT /tasks/{task_id}
/// Partial update of the caller's own task.
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<UpdateTaskRequest>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let mut update_doc = doc! {};
    if let Some(title) = &payload.title {
        if title.trim().is_empty() {
            return HttpResponse::BadRequest().body("Title is required");
        }
        update_doc.insert("title", title);
    }
    if let Some(description) = &payload.description {
        update_doc.insert("description", description);
    }
    if let Some(status) = payload.status {
        update_doc.insert("status", status.as_str());
    }
    if let Some(priority) = payload.priority {
        update_doc.insert("priority", priority.as_str());
    }
    if let Some(due_date) = &payload.due_date {
        update_doc.insert("due_date", due_date.to_rfc3339());
    }

    if update_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }
    update_doc.insert("updated_at", Utc::now().to_rfc3339());

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    let filter = doc! { "task_id": &task_id, "user_id": &current_user };
    match tasks_coll
        .update_one(filter.clone(), doc! { "$set": update_doc })
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().body("Task not found"),
        Ok(_) => match tasks_coll.find_one(filter).await {
            Ok(Some(task)) => HttpResponse::Ok().json(task),
            Ok(None) => HttpResponse::NotFound().body("Task not found"),
            Err(e) => {
                error!("Error reloading task: {}", e);
                HttpResponse::InternalServerError().body(format!("Error reloading task: {}", e))
            }
        },
        Err(e) => {
            error!("Error updating task: {}", e);
            HttpResponse::InternalServerError().body(format!("Error updating task: {}", e))
        }
    }
}

/// DELETE /tasks/{task_id}
/// Deletes the caller's own task along with its assignment-history rows.
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> impl Responder {
    let task_id = task_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    match tasks_coll
        .delete_one(doc! { "task_id": &task_id, "user_id": &current_user })
        .await
    {
        Ok(res) if res.deleted_count == 0 => HttpResponse::NotFound().body("Task not found"),
        Ok(_) => {
            let assignments_coll = data
                .mongodb
                .db
                .collection::<TaskAssignment>("task_assignments");
            if let Err(e) = assignments_coll
                .delete_many(doc! { "task_id": &task_id })
                .await
            {
                warn!(
                    "Failed to clean up assignment history for task {}: {}",
                    task_id, e
                );
            }
            HttpResponse::Ok().body("Task deleted")
        }
        Err(e) => {
            error!("Error deleting task: {}", e);
            HttpResponse::InternalServerError().body(format!("Error deleting task: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(status: TaskStatus, due_date: Option<chrono::DateTime<Utc>>) -> Task {
        Task {
            task_id: Uuid::new_v4().to_string(),
            user_id: "u1".to_string(),
            title: "t".to_string(),
            description: None,
            status,
            priority: TaskPriority::Medium,
            due_date,
            team_id: None,
            assigned_to: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn due_today_compares_calendar_dates_only() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        let late_tonight = Utc.with_ymd_and_hms(2025, 6, 12, 23, 59, 0).unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2025, 6, 13, 0, 1, 0).unwrap();

        let tasks = vec![
            task(TaskStatus::Todo, Some(late_tonight)),
            task(TaskStatus::Todo, Some(tomorrow)),
            task(TaskStatus::Todo, None),
        ];

        let stats = owner_task_stats(&tasks, today);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.today, 1);
    }

    #[test]
    fn stats_count_upcoming_and_done_by_status() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        let tasks = vec![
            task(TaskStatus::Upcoming, None),
            task(TaskStatus::Upcoming, None),
            task(TaskStatus::Done, None),
            task(TaskStatus::Backlog, None),
        ];

        let stats = owner_task_stats(&tasks, today);
        assert_eq!(stats.upcoming, 2);
        assert_eq!(stats.done, 1);
        assert_eq!(stats.total, 4);
    }

    #[test]
    fn stats_on_empty_list_are_zero() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        let stats = owner_task_stats(&[], today);
        assert_eq!(
            stats,
            TaskStats {
                total: 0,
                today: 0,
                upcoming: 0,
                done: 0
            }
        );
    }
}
