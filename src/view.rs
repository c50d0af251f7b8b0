//! Output shapes and terminal rendering.
//!
//! Task views resolve user ids to [`UserSummary`] values. Ids of deleted
//! users resolve to nothing.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::fields::*;
use crate::scope::AnalyticsSummary;
use crate::task::{Milestone, MilestoneId, Task, TaskId};
use crate::user::{User, UserId, UserSummary};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneView {
    pub id: MilestoneId,
    pub title: String,
    pub status: MilestoneStatus,
    pub assigned_to: Option<UserSummary>,
    pub assigned_department: Option<Department>,
    pub completed_by: Option<UserSummary>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub department: Department,
    pub assigned_to: Vec<UserSummary>,
    pub status: TaskStatus,
    pub progress: u8,
    pub milestones: Vec<MilestoneView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deadline: Option<NaiveDate>,
}

fn summary(users: &[User], id: Option<UserId>) -> Option<UserSummary> {
    let id = id?;
    users.iter().find(|u| u.id == id).map(UserSummary::from)
}

fn milestone_view(m: &Milestone, users: &[User]) -> MilestoneView {
    MilestoneView {
        id: m.id,
        title: m.title.clone(),
        status: m.status,
        assigned_to: summary(users, m.assigned_to),
        assigned_department: m.assigned_department,
        completed_by: summary(users, m.completed_by),
        completed_at: m.completed_at,
    }
}

pub fn task_view(task: &Task, users: &[User]) -> TaskView {
    TaskView {
        id: task.id,
        title: task.title.clone(),
        description: task.description.clone(),
        department: task.department,
        assigned_to: task
            .assigned_to
            .iter()
            .filter_map(|id| summary(users, Some(*id)))
            .collect(),
        status: task.status,
        progress: task.progress,
        milestones: task.milestones.iter().map(|m| milestone_view(m, users)).collect(),
        created_at: task.created_at,
        updated_at: task.updated_at,
        deadline: task.deadline,
    }
}

/// Format a deadline relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let delta = (d - today).num_days();
            match delta {
                0 => "today".into(),
                1 => "tomorrow".into(),
                n if n > 1 => format!("in {n}d"),
                n => format!("{}d late", -n),
            }
        }
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

fn short_id(id: impl std::fmt::Display) -> String {
    id.to_string().chars().take(8).collect()
}

fn progress_bar(progress: u8, width: usize) -> String {
    let filled = (usize::from(progress) * width + 50) / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled.min(width)))
}

/// Print tasks as a table.
pub fn print_table(tasks: &[TaskView]) {
    println!(
        "{:<8} {:<18} {:<11} {:>4} {:<7} {:<10} {}",
        "ID", "Department", "Status", "Pct", "Steps", "Due", "Title"
    );
    let today = Local::now().date_naive();
    for t in tasks {
        let done = t.milestones.iter().filter(|m| m.status == MilestoneStatus::Done).count();
        println!(
            "{:<8} {:<18} {:<11} {:>3}% {:<7} {:<10} {}",
            short_id(t.id),
            truncate(format_department(t.department), 18),
            format_task_status(t.status),
            t.progress,
            format!("{}/{}", done, t.milestones.len()),
            format_due_relative(t.deadline, today),
            t.title
        );
    }
}

fn user_label(u: &UserSummary) -> String {
    if u.name.is_empty() {
        u.email.clone()
    } else {
        format!("{} <{}>", u.name, u.email)
    }
}

/// Print one task with its milestones.
pub fn print_task(t: &TaskView) {
    let today = Local::now().date_naive();
    println!("ID:           {}", t.id);
    println!("Title:        {}", t.title);
    println!("Department:   {}", format_department(t.department));
    println!("Status:       {}", format_task_status(t.status));
    println!("Progress:     {} {}%", progress_bar(t.progress, 20), t.progress);
    println!(
        "Deadline:     {}",
        match t.deadline {
            Some(d) => format!("{d} ({})", format_due_relative(Some(d), today)),
            None => "-".into(),
        }
    );
    println!(
        "Assigned to:  {}",
        if t.assigned_to.is_empty() {
            "-".into()
        } else {
            t.assigned_to.iter().map(user_label).collect::<Vec<_>>().join(", ")
        }
    );
    println!("Created UTC:  {}", t.created_at.to_rfc3339());
    println!("Updated UTC:  {}", t.updated_at.to_rfc3339());
    println!(
        "Description:\n{}\n",
        if t.description.is_empty() { "-" } else { t.description.as_str() }
    );

    println!("Milestones:");
    if t.milestones.is_empty() {
        println!("  -");
    }
    for (i, m) in t.milestones.iter().enumerate() {
        let mark = if m.status == MilestoneStatus::Done { "x" } else { " " };
        let owner = match (&m.assigned_to, m.assigned_department) {
            (Some(u), _) => user_label(u),
            (None, Some(d)) => format!("dept: {d}"),
            (None, None) => "unassigned".into(),
        };
        println!("  {:>2}. [{}] {} ({})", i + 1, mark, m.title, owner);
        if let (Some(by), Some(at)) = (&m.completed_by, m.completed_at) {
            println!("        done by {} at {}", user_label(by), at.to_rfc3339());
        }
    }
}

pub fn print_users(users: &[UserSummary]) {
    println!("{:<36} {:<28} {:<13} {:<18} {}", "ID", "Email", "Role", "Department", "Name");
    for u in users {
        println!(
            "{:<36} {:<28} {:<13} {:<18} {}",
            u.id,
            truncate(&u.email, 28),
            format_role(u.role),
            u.department.map(format_department).unwrap_or("-"),
            u.name
        );
    }
}

pub fn print_analytics(s: &AnalyticsSummary) {
    println!("Total tasks:      {}", s.total_tasks);
    println!("Completed tasks:  {}", s.completed_tasks);
    println!("Completion rate:  {}%", s.completion_rate);
}

/// Render tasks as CSV, one row per task.
pub fn tasks_to_csv(tasks: &[TaskView]) -> String {
    let escape_csv = |s: &str| {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    };
    let mut csv = String::from("ID,Title,Department,Status,Progress,MilestonesDone,MilestonesTotal,Deadline,AssignedTo,CreatedUTC,Description\n");
    for t in tasks {
        let done = t.milestones.iter().filter(|m| m.status == MilestoneStatus::Done).count();
        let assignees = t.assigned_to.iter().map(|u| u.email.as_str()).collect::<Vec<_>>().join(";");
        let deadline = t.deadline.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{}\n",
            t.id,
            escape_csv(&t.title),
            escape_csv(format_department(t.department)),
            format_task_status(t.status),
            t.progress,
            done,
            t.milestones.len(),
            deadline,
            escape_csv(&assignees),
            t.created_at.to_rfc3339(),
            escape_csv(&t.description),
        ));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Role;
    use uuid::Uuid;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: format!("{}@example.org", name.to_lowercase()),
            password_hash: "secret-hash".into(),
            role: Role::Staff,
            department: Some(Department::Finance),
        }
    }

    #[test]
    fn test_task_view_resolves_known_users_only() {
        let alice = user("Alice");
        let gone = Uuid::new_v4();
        let mut task = Task::new("Budget", Department::Finance, Utc::now());
        task.assigned_to = vec![alice.id, gone];
        let mut m = Milestone::new("Draft");
        m.assigned_to = Some(alice.id);
        task.milestones.push(m);

        let view = task_view(&task, std::slice::from_ref(&alice));
        assert_eq!(view.assigned_to.len(), 1);
        assert_eq!(view.assigned_to[0].email, "alice@example.org");
        assert_eq!(view.milestones[0].assigned_to.as_ref().map(|u| u.id), Some(alice.id));

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"assignedTo\""));
    }

    #[test]
    fn test_format_due_relative() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(format_due_relative(None, today), "-");
        assert_eq!(format_due_relative(Some(today), today), "today");
        assert_eq!(format_due_relative(today.succ_opt(), today), "tomorrow");
        assert_eq!(format_due_relative(NaiveDate::from_ymd_opt(2024, 5, 13), today), "in 3d");
        assert_eq!(format_due_relative(NaiveDate::from_ymd_opt(2024, 5, 8), today), "2d late");
    }

    #[test]
    fn test_truncate_and_progress_bar() {
        assert_eq!(truncate("Finance", 18), "Finance");
        assert_eq!(truncate("Project Management", 8), "Project…");
        assert_eq!(progress_bar(0, 4), "[....]");
        assert_eq!(progress_bar(50, 4), "[##..]");
        assert_eq!(progress_bar(100, 4), "[####]");
    }

    #[test]
    fn test_csv_escapes_fields() {
        let mut task = Task::new("Plan, then act", Department::ContractStaff, Utc::now());
        task.description = "say \"hi\"".into();
        let csv = tasks_to_csv(&[task_view(&task, &[])]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains("\"Plan, then act\""));
        assert!(row.contains("Contract Staff"));
        assert!(row.contains("\"say \"\"hi\"\"\""));
    }
}
