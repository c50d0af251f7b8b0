//! Enumerations shared by users, tasks and milestones.
//!
//! Roles and departments are closed sets. Parsing from free text goes through
//! [`parse_role`] and [`parse_department`], which reject anything outside the
//! set with a validation error instead of falling back to a default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Organisational role carried by every user and every identity token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Creator,
    Admin,
    Hod,
    ProjectLead,
    Staff,
    Contract,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Creator,
        Role::Admin,
        Role::Hod,
        Role::ProjectLead,
        Role::Staff,
        Role::Contract,
    ];

    /// Roles whose permissions are scoped to a department and so need one.
    pub fn requires_department(self) -> bool {
        match self {
            Role::Hod | Role::ProjectLead | Role::Staff => true,
            Role::Creator | Role::Admin | Role::Contract => false,
        }
    }
}

/// Departments a task can belong to or a milestone can be assigned to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Department {
    Management,
    Finance,
    #[serde(rename = "Contract Staff")]
    ContractStaff,
    #[serde(rename = "Project Management")]
    ProjectManagement,
    Marketing,
    Operations,
}

impl Department {
    pub const ALL: [Department; 6] = [
        Department::Management,
        Department::Finance,
        Department::ContractStaff,
        Department::ProjectManagement,
        Department::Marketing,
        Department::Operations,
    ];
}

/// Aggregate task state. Always derived from milestones, never set directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MilestoneStatus {
    #[default]
    #[serde(rename = "Not Done")]
    NotDone,
    Done,
}

/// Format a role the way it is stored and typed on the command line.
pub fn format_role(r: Role) -> &'static str {
    match r {
        Role::Creator => "creator",
        Role::Admin => "admin",
        Role::Hod => "hod",
        Role::ProjectLead => "project_lead",
        Role::Staff => "staff",
        Role::Contract => "contract",
    }
}

pub fn format_department(d: Department) -> &'static str {
    match d {
        Department::Management => "Management",
        Department::Finance => "Finance",
        Department::ContractStaff => "Contract Staff",
        Department::ProjectManagement => "Project Management",
        Department::Marketing => "Marketing",
        Department::Operations => "Operations",
    }
}

pub fn format_task_status(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::NotStarted => "Not Started",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::Completed => "Completed",
    }
}

pub fn format_milestone_status(s: MilestoneStatus) -> &'static str {
    match s {
        MilestoneStatus::NotDone => "Not Done",
        MilestoneStatus::Done => "Done",
    }
}

/// Fold separators and case so "project-lead", "Project Lead" and
/// "project_lead" all compare equal.
fn fold(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse a role name. Unknown roles are a validation error, never a default.
pub fn parse_role(s: &str) -> Result<Role, TrackerError> {
    let key = fold(s);
    Role::ALL
        .into_iter()
        .find(|r| fold(format_role(*r)) == key)
        .ok_or_else(|| {
            TrackerError::validation(format!(
                "invalid role '{}'; expected one of: {}",
                s.trim(),
                Role::ALL.map(format_role).join(", ")
            ))
        })
}

/// Parse a department name, accepting any case and space/dash/underscore spelling.
pub fn parse_department(s: &str) -> Result<Department, TrackerError> {
    let key = fold(s);
    Department::ALL
        .into_iter()
        .find(|d| fold(format_department(*d)) == key)
        .ok_or_else(|| {
            TrackerError::validation(format!(
                "invalid department '{}'; expected one of: {}",
                s.trim(),
                Department::ALL.map(format_department).join(", ")
            ))
        })
}

pub fn parse_task_status(s: &str) -> Result<TaskStatus, TrackerError> {
    match fold(s).as_str() {
        "notstarted" => Ok(TaskStatus::NotStarted),
        "inprogress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        _ => Err(TrackerError::validation(format!(
            "invalid task status '{}'; expected not-started, in-progress or completed",
            s.trim()
        ))),
    }
}

pub fn parse_milestone_status(s: &str) -> Result<MilestoneStatus, TrackerError> {
    match fold(s).as_str() {
        "done" => Ok(MilestoneStatus::Done),
        "notdone" => Ok(MilestoneStatus::NotDone),
        _ => Err(TrackerError::validation(format!(
            "invalid milestone status '{}'; expected 'Done' or 'Not Done'",
            s.trim()
        ))),
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(format_role(*self))
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(format_department(*self))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(format_task_status(*self))
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(format_milestone_status(*self))
    }
}

impl FromStr for Role {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_role(s)
    }
}

impl FromStr for Department {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_department(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_department_spellings() {
        assert_eq!(parse_department("Finance").unwrap(), Department::Finance);
        assert_eq!(parse_department("contract-staff").unwrap(), Department::ContractStaff);
        assert_eq!(parse_department(" project_management ").unwrap(), Department::ProjectManagement);
        assert!(matches!(parse_department("Legal"), Err(TrackerError::Validation(_))));
        assert!(matches!(parse_department(""), Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_parse_role_rejects_unknown() {
        assert_eq!(parse_role("project-lead").unwrap(), Role::ProjectLead);
        assert_eq!(parse_role("HOD").unwrap(), Role::Hod);
        assert!(matches!(parse_role("superuser"), Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_parse_statuses() {
        assert_eq!(parse_task_status("in-progress").unwrap(), TaskStatus::InProgress);
        assert_eq!(parse_task_status("Not Started").unwrap(), TaskStatus::NotStarted);
        assert!(parse_task_status("done").is_err());
        assert_eq!(parse_milestone_status("not_done").unwrap(), MilestoneStatus::NotDone);
        assert_eq!(parse_milestone_status("DONE").unwrap(), MilestoneStatus::Done);
    }

    #[test]
    fn test_serde_uses_display_names() {
        assert_eq!(serde_json::to_string(&Department::ContractStaff).unwrap(), "\"Contract Staff\"");
        assert_eq!(serde_json::to_string(&Role::ProjectLead).unwrap(), "\"project_lead\"");
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"In Progress\"");
        assert!(serde_json::from_str::<Role>("\"root\"").is_err());
    }

    #[test]
    fn test_department_required_for_scoped_roles() {
        let scoped: Vec<Role> = Role::ALL.into_iter().filter(|r| r.requires_department()).collect();
        assert_eq!(scoped, vec![Role::Hod, Role::ProjectLead, Role::Staff]);
    }
}
