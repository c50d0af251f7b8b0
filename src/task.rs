//! Task and milestone data structures.
//!
//! A task owns its milestones. `status` and `progress` on a task are derived
//! from the milestones by [`crate::progress::recompute_progress`] and are only
//! ever written through [`Task::refresh_progress`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fields::*;
use crate::progress::recompute_progress;
use crate::user::UserId;

pub type TaskId = Uuid;
pub type MilestoneId = Uuid;

/// A departmental work item broken into milestones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub department: Department,
    #[serde(default)]
    pub assigned_to: Vec<UserId>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deadline: Option<NaiveDate>,
    /// Incremented on every write; used for compare-and-swap updates.
    #[serde(default)]
    pub version: u64,
}

/// A named step inside a task.
///
/// At most one of `assigned_to` and `assigned_department` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: MilestoneId,
    pub title: String,
    #[serde(default)]
    pub status: MilestoneStatus,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub assigned_department: Option<Department>,
    #[serde(default)]
    pub completed_by: Option<UserId>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Milestone {
    pub fn new(title: impl Into<String>) -> Self {
        Milestone {
            id: Uuid::new_v4(),
            title: title.into(),
            status: MilestoneStatus::NotDone,
            assigned_to: None,
            assigned_department: None,
            completed_by: None,
            completed_at: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == MilestoneStatus::Done
    }

    /// Mark done, recording who completed it and when.
    pub fn complete(&mut self, by: UserId, at: DateTime<Utc>) {
        self.status = MilestoneStatus::Done;
        self.completed_by = Some(by);
        self.completed_at = Some(at);
    }

    /// Return to Not Done and clear the completion record.
    pub fn reopen(&mut self) {
        self.status = MilestoneStatus::NotDone;
        self.completed_by = None;
        self.completed_at = None;
    }
}

impl Task {
    pub fn new(title: impl Into<String>, department: Department, now: DateTime<Utc>) -> Self {
        Task {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            department,
            assigned_to: Vec::new(),
            status: TaskStatus::NotStarted,
            progress: 0,
            milestones: Vec::new(),
            created_at: now,
            updated_at: now,
            deadline: None,
            version: 0,
        }
    }

    /// Overwrite `progress` and `status` from the current milestones.
    pub fn refresh_progress(&mut self) {
        let (progress, status) = recompute_progress(&self.milestones);
        self.progress = progress;
        self.status = status;
    }

    pub fn milestone_index(&self, r: &MilestoneRef) -> Option<usize> {
        match r {
            MilestoneRef::Position(p) => p.checked_sub(1).filter(|&i| i < self.milestones.len()),
            MilestoneRef::Id(id) => self.milestones.iter().position(|m| m.id == *id),
        }
    }

    pub fn has_milestone_assigned_to(&self, user: UserId) -> bool {
        self.milestones.iter().any(|m| m.assigned_to == Some(user))
    }

    pub fn done_count(&self) -> usize {
        self.milestones.iter().filter(|m| m.is_done()).count()
    }
}

/// Reference to a milestone inside a task: stable id or 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneRef {
    Position(usize),
    Id(MilestoneId),
}

impl std::fmt::Display for MilestoneRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MilestoneRef::Position(p) => write!(f, "#{p}"),
            MilestoneRef::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Parse a milestone reference: a UUID, or a 1-based position.
pub fn parse_milestone_ref(s: &str) -> Option<MilestoneRef> {
    let s = s.trim().trim_start_matches('#');
    if let Ok(id) = Uuid::parse_str(s) {
        return Some(MilestoneRef::Id(id));
    }
    match s.parse::<usize>() {
        Ok(p) if p > 0 => Some(MilestoneRef::Position(p)),
        _ => None,
    }
}

/// Caller-supplied milestone used when creating a task or replacing the whole
/// milestone sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneDraft {
    /// Existing milestone this draft replaces, if any.
    #[serde(default)]
    pub id: Option<MilestoneId>,
    pub title: String,
    #[serde(default)]
    pub status: Option<MilestoneStatus>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub assigned_department: Option<Department>,
}

impl MilestoneDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        MilestoneDraft {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Fields needed to create a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub department: String,
    pub deadline: Option<NaiveDate>,
    pub assigned_to: Vec<UserId>,
    pub milestones: Vec<MilestoneDraft>,
}

/// Partial update of a task. Carries no status or progress; both are
/// recomputed from milestones.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub department: Option<String>,
    /// `Some(None)` clears the deadline.
    pub deadline: Option<Option<NaiveDate>>,
    pub assigned_to: Option<Vec<UserId>>,
    pub milestones: Option<Vec<MilestoneDraft>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.department.is_none()
            && self.deadline.is_none()
            && self.assigned_to.is_none()
            && self.milestones.is_none()
    }
}

/// Milestone assignment request. Exactly one side must be set.
#[derive(Debug, Clone, Default)]
pub struct MilestoneAssignment {
    pub assigned_to: Option<UserId>,
    pub assigned_department: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_milestone_ref() {
        assert_eq!(parse_milestone_ref("2"), Some(MilestoneRef::Position(2)));
        assert_eq!(parse_milestone_ref("#3"), Some(MilestoneRef::Position(3)));
        assert_eq!(parse_milestone_ref("0"), None);
        assert_eq!(parse_milestone_ref("abc"), None);
        let id = Uuid::new_v4();
        assert_eq!(parse_milestone_ref(&id.to_string()), Some(MilestoneRef::Id(id)));
    }

    #[test]
    fn test_milestone_index_bounds() {
        let mut t = Task::new("t", Department::Finance, Utc::now());
        t.milestones.push(Milestone::new("a"));
        t.milestones.push(Milestone::new("b"));
        assert_eq!(t.milestone_index(&MilestoneRef::Position(1)), Some(0));
        assert_eq!(t.milestone_index(&MilestoneRef::Position(2)), Some(1));
        assert_eq!(t.milestone_index(&MilestoneRef::Position(3)), None);
        let id = t.milestones[1].id;
        assert_eq!(t.milestone_index(&MilestoneRef::Id(id)), Some(1));
    }

    #[test]
    fn test_complete_and_reopen() {
        let mut m = Milestone::new("review");
        let who = Uuid::new_v4();
        let at = Utc::now();
        m.complete(who, at);
        assert!(m.is_done());
        assert_eq!(m.completed_by, Some(who));
        assert_eq!(m.completed_at, Some(at));
        m.reopen();
        assert!(!m.is_done());
        assert_eq!(m.completed_by, None);
        assert_eq!(m.completed_at, None);
    }
}
