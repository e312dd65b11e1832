// src/dashboard.rs

use std::collections::{HashMap, HashSet};

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::error;
use mongodb::bson::doc;
use mongodb::Database;
use serde::Serialize;

use crate::app_state::AppState;
use crate::membership::{self, MemberWithProfile};
use crate::models::{Profile, Task, TaskPriority, TaskStatus, Team};

#[derive(Debug, PartialEq, Serialize)]
pub struct TeamStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub backlog_tasks: usize,
    pub completion_rate: u32,
    pub high_priority_tasks: usize,
    pub medium_priority_tasks: usize,
    pub low_priority_tasks: usize,
    pub overdue_tasks: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MemberWorkload {
    pub total: usize,
    pub done: usize,
}

#[derive(Debug, Serialize)]
pub struct TeamDashboard {
    pub stats: TeamStats,
    pub tasks: Vec<Task>,
    pub members: Vec<MemberWithProfile>,
    pub tasks_by_member: HashMap<String, MemberWorkload>,
}

/// Derives the team counters from one pass over the fetched tasks.
/// In-progress means todo or upcoming; priority counters only count open
/// (non-done) tasks; a done task is never overdue, however old its due date.
pub fn team_stats(tasks: &[Task], now: DateTime<Utc>) -> TeamStats {
    let total_tasks = tasks.len();
    let completed_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .count();
    let in_progress_tasks = tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Todo | TaskStatus::Upcoming))
        .count();
    let backlog_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Backlog)
        .count();

    let completion_rate = if total_tasks > 0 {
        ((completed_tasks as f64 / total_tasks as f64) * 100.0).round() as u32
    } else {
        0
    };

    let open_with_priority = |priority: TaskPriority| {
        tasks
            .iter()
            .filter(|t| t.priority == priority && t.status != TaskStatus::Done)
            .count()
    };

    let overdue_tasks = tasks
        .iter()
        .filter(|t| match t.due_date {
            Some(due) => t.status != TaskStatus::Done && due < now,
            None => false,
        })
        .count();

    TeamStats {
        total_tasks,
        completed_tasks,
        in_progress_tasks,
        backlog_tasks,
        completion_rate,
        high_priority_tasks: open_with_priority(TaskPriority::High),
        medium_priority_tasks: open_with_priority(TaskPriority::Medium),
        low_priority_tasks: open_with_priority(TaskPriority::Low),
        overdue_tasks,
    }
}

/// Per-member workload over the team's tasks. Only tasks with an assignee
/// count; unassigned tasks appear in no bucket.
pub fn member_workload(tasks: &[Task]) -> HashMap<String, MemberWorkload> {
    let mut workload: HashMap<String, MemberWorkload> = HashMap::new();
    for task in tasks {
        if let Some(assignee) = &task.assigned_to {
            let entry = workload.entry(assignee.clone()).or_default();
            entry.total += 1;
            if task.status == TaskStatus::Done {
                entry.done += 1;
            }
        }
    }
    workload
}

// ─── TASK ENRICHMENT ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignedUser {
    pub user_id: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRef {
    pub team_id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TaskWithRelations {
    #[serde(flatten)]
    pub task: Task,
    pub assigned_user: Option<AssignedUser>,
    pub team: Option<TeamRef>,
}

/// Pairs each task with its resolved assignee and team, both `None` when
/// unset or unresolved. Task order is preserved.
pub fn merge_relations(
    tasks: Vec<Task>,
    profiles: &HashMap<String, Profile>,
    teams: &HashMap<String, Team>,
) -> Vec<TaskWithRelations> {
    tasks
        .into_iter()
        .map(|task| {
            let assigned_user = task
                .assigned_to
                .as_ref()
                .and_then(|id| profiles.get(id))
                .map(|p| AssignedUser {
                    user_id: p.user_id.clone(),
                    full_name: p.full_name.clone(),
                    avatar_url: p.avatar_url.clone(),
                });
            let team = task
                .team_id
                .as_ref()
                .and_then(|id| teams.get(id))
                .map(|t| TeamRef {
                    team_id: t.team_id.clone(),
                    name: t.name.clone(),
                });
            TaskWithRelations {
                task,
                assigned_user,
                team,
            }
        })
        .collect()
}

/// Resolves assignee and team metadata for a batch of tasks with two `$in`
/// queries over the distinct ids, then joins in memory. Never issues one
/// query per task.
pub async fn enrich_with_relations(
    db: &Database,
    tasks: Vec<Task>,
) -> mongodb::error::Result<Vec<TaskWithRelations>> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let user_ids: Vec<String> = tasks
        .iter()
        .filter_map(|t| t.assigned_to.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let team_ids: Vec<String> = tasks
        .iter()
        .filter_map(|t| t.team_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut profiles: HashMap<String, Profile> = HashMap::new();
    if !user_ids.is_empty() {
        let mut cursor = db
            .collection::<Profile>("profiles")
            .find(doc! { "user_id": { "$in": user_ids } })
            .await?;
        while let Some(profile) = cursor.next().await {
            let profile = profile?;
            profiles.insert(profile.user_id.clone(), profile);
        }
    }

    let mut teams: HashMap<String, Team> = HashMap::new();
    if !team_ids.is_empty() {
        let mut cursor = db
            .collection::<Team>("teams")
            .find(doc! { "team_id": { "$in": team_ids } })
            .await?;
        while let Some(team) = cursor.next().await {
            let team = team?;
            teams.insert(team.team_id.clone(), team);
        }
    }

    Ok(merge_relations(tasks, &profiles, &teams))
}

/// GET /teams/{team_id}/dashboard
/// Team statistics derived from two independent queries: the team's tasks
/// and its members with profiles. Members only.
pub async fn team_dashboard(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> impl Responder {
    let team_id = team_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    // 1) Fetch the team's tasks.
    let tasks_coll = data.mongodb.db.collection::<Task>("tasks");
    let mut cursor = match tasks_coll.find(doc! { "team_id": &team_id }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching team tasks: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching team tasks: {}", e));
        }
    };
    let mut tasks: Vec<Task> = Vec::new();
    while let Some(task_res) = cursor.next().await {
        match task_res {
            Ok(task) => tasks.push(task),
            Err(e) => {
                error!("Error iterating team tasks: {}", e);
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating team tasks: {}", e));
            }
        }
    }

    // 2) Fetch the roster with profiles.
    let members = match membership::members_with_profiles(&data.mongodb.db, &team_id).await {
        Ok(members) => members,
        Err(e) => {
            error!("Error fetching team members: {}", e);
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching team members: {}", e));
        }
    };

    if !members.iter().any(|m| m.member.user_id == current_user) {
        return HttpResponse::Unauthorized().body("Not a member of the team");
    }

    let stats = team_stats(&tasks, Utc::now());
    let tasks_by_member = member_workload(&tasks);

    HttpResponse::Ok().json(TeamDashboard {
        stats,
        tasks,
        members,
        tasks_by_member,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn task(
        status: TaskStatus,
        priority: TaskPriority,
        due_date: Option<DateTime<Utc>>,
        assigned_to: Option<&str>,
    ) -> Task {
        Task {
            task_id: Uuid::new_v4().to_string(),
            user_id: "creator".to_string(),
            title: "t".to_string(),
            description: None,
            status,
            priority,
            due_date,
            team_id: Some("team-1".to_string()),
            assigned_to: assigned_to.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn overdue_excludes_done_tasks_and_completion_rounds() {
        let now = Utc::now();
        let yesterday = now - Duration::days(1);
        let tasks = vec![
            task(TaskStatus::Todo, TaskPriority::High, Some(yesterday), None),
            task(TaskStatus::Done, TaskPriority::Low, Some(yesterday), None),
        ];

        let stats = team_stats(&tasks, now);
        assert_eq!(stats.overdue_tasks, 1);
        assert_eq!(stats.completion_rate, 50);
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.completed_tasks, 1);
    }

    #[test]
    fn empty_team_has_zero_completion_rate() {
        let stats = team_stats(&[], Utc::now());
        assert_eq!(stats.completion_rate, 0);
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.overdue_tasks, 0);
    }

    #[test]
    fn completion_rate_rounds_to_nearest_percent() {
        let now = Utc::now();
        let tasks = vec![
            task(TaskStatus::Done, TaskPriority::Medium, None, None),
            task(TaskStatus::Todo, TaskPriority::Medium, None, None),
            task(TaskStatus::Todo, TaskPriority::Medium, None, None),
        ];
        // 1/3 done rounds to 33.
        assert_eq!(team_stats(&tasks, now).completion_rate, 33);

        let tasks = vec![
            task(TaskStatus::Done, TaskPriority::Medium, None, None),
            task(TaskStatus::Done, TaskPriority::Medium, None, None),
            task(TaskStatus::Todo, TaskPriority::Medium, None, None),
        ];
        // 2/3 done rounds to 67.
        assert_eq!(team_stats(&tasks, now).completion_rate, 67);
    }

    #[test]
    fn priority_counters_only_count_open_tasks() {
        let now = Utc::now();
        let tasks = vec![
            task(TaskStatus::Todo, TaskPriority::High, None, None),
            task(TaskStatus::Done, TaskPriority::High, None, None),
            task(TaskStatus::Backlog, TaskPriority::Low, None, None),
            task(TaskStatus::Upcoming, TaskPriority::Medium, None, None),
        ];

        let stats = team_stats(&tasks, now);
        assert_eq!(stats.high_priority_tasks, 1);
        assert_eq!(stats.medium_priority_tasks, 1);
        assert_eq!(stats.low_priority_tasks, 1);
        assert_eq!(stats.in_progress_tasks, 2);
        assert_eq!(stats.backlog_tasks, 1);
    }

    #[test]
    fn tasks_without_due_date_are_never_overdue() {
        let now = Utc::now();
        let tasks = vec![task(TaskStatus::Todo, TaskPriority::Medium, None, None)];
        assert_eq!(team_stats(&tasks, now).overdue_tasks, 0);
    }

    #[test]
    fn workload_only_counts_assigned_tasks() {
        let tasks = vec![
            task(TaskStatus::Done, TaskPriority::Medium, None, Some("alice")),
            task(TaskStatus::Todo, TaskPriority::Medium, None, Some("alice")),
            task(TaskStatus::Todo, TaskPriority::Medium, None, Some("bob")),
            task(TaskStatus::Todo, TaskPriority::Medium, None, None),
        ];

        let workload = member_workload(&tasks);
        assert_eq!(workload.len(), 2);
        assert_eq!(workload["alice"], MemberWorkload { total: 2, done: 1 });
        assert_eq!(workload["bob"], MemberWorkload { total: 1, done: 0 });
    }

    #[test]
    fn merge_relations_resolves_known_ids_and_leaves_the_rest_none() {
        let mut with_both = task(TaskStatus::Todo, TaskPriority::Medium, None, Some("alice"));
        with_both.team_id = Some("team-1".to_string());
        let mut unresolved = task(TaskStatus::Todo, TaskPriority::Medium, None, Some("ghost"));
        unresolved.team_id = Some("missing-team".to_string());
        let mut bare = task(TaskStatus::Todo, TaskPriority::Medium, None, None);
        bare.team_id = None;

        let profiles: HashMap<String, Profile> = [(
            "alice".to_string(),
            Profile {
                user_id: "alice".to_string(),
                email: "alice@example.com".to_string(),
                full_name: Some("Alice".to_string()),
                avatar_url: None,
                created_at: Utc::now(),
            },
        )]
        .into_iter()
        .collect();
        let teams: HashMap<String, Team> = [(
            "team-1".to_string(),
            Team {
                team_id: "team-1".to_string(),
                name: "Alpha".to_string(),
                description: None,
                owner_id: "alice".to_string(),
                invite_code: "AAAA000000".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        )]
        .into_iter()
        .collect();

        let detailed = merge_relations(vec![with_both, unresolved, bare], &profiles, &teams);
        assert_eq!(detailed.len(), 3);
        assert_eq!(
            detailed[0].assigned_user.as_ref().map(|u| u.user_id.as_str()),
            Some("alice")
        );
        assert_eq!(
            detailed[0].team.as_ref().map(|t| t.name.as_str()),
            Some("Alpha")
        );
        assert!(detailed[1].assigned_user.is_none());
        assert!(detailed[1].team.is_none());
        assert!(detailed[2].assigned_user.is_none());
        assert!(detailed[2].team.is_none());
    }
}
