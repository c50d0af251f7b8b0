//! Visibility scoping for task queries and the analytics summary.

use serde::{Deserialize, Serialize};

use crate::fields::{Department, Role, TaskStatus};
use crate::progress::percent;
use crate::task::Task;
use crate::user::{Identity, UserId};

/// Predicate selecting the tasks an identity may see. Stores evaluate it in
/// `find_tasks`, so listing and analytics read the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    All,
    Department(Department),
    MilestoneAssignee(UserId),
    Nothing,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Department(d) => task.department == *d,
            TaskFilter::MilestoneAssignee(u) => task.has_milestone_assigned_to(*u),
            TaskFilter::Nothing => false,
        }
    }
}

pub fn task_visibility_filter(actor: &Identity) -> TaskFilter {
    match actor.role {
        Role::Creator | Role::Admin | Role::ProjectLead => TaskFilter::All,
        Role::Hod | Role::Staff => match actor.department {
            Some(d) => TaskFilter::Department(d),
            None => TaskFilter::Nothing,
        },
        Role::Contract => TaskFilter::MilestoneAssignee(actor.id),
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub completion_rate: u8,
}

/// Summarise an already-scoped set of tasks.
pub fn summarise<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> AnalyticsSummary {
    let (total, completed) = tasks.into_iter().fold((0, 0), |(total, completed), t| {
        (total + 1, completed + usize::from(t.status == TaskStatus::Completed))
    });
    AnalyticsSummary {
        total_tasks: total,
        completed_tasks: completed,
        completion_rate: percent(completed, total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Milestone;
    use chrono::Utc;
    use uuid::Uuid;

    fn identity(role: Role, department: Option<Department>) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            role,
            department,
            email: String::new(),
            name: String::new(),
        }
    }

    #[test]
    fn test_filters_per_role() {
        assert_eq!(task_visibility_filter(&identity(Role::Admin, None)), TaskFilter::All);
        assert_eq!(
            task_visibility_filter(&identity(Role::Staff, Some(Department::Finance))),
            TaskFilter::Department(Department::Finance)
        );
        assert_eq!(task_visibility_filter(&identity(Role::Hod, None)), TaskFilter::Nothing);
        let c = identity(Role::Contract, Some(Department::Finance));
        assert_eq!(task_visibility_filter(&c), TaskFilter::MilestoneAssignee(c.id));
    }

    #[test]
    fn test_contract_filter_ignores_department() {
        let c = identity(Role::Contract, Some(Department::Finance));
        let filter = task_visibility_filter(&c);
        let same_dept = Task::new("a", Department::Finance, Utc::now());
        let mut assigned = Task::new("b", Department::Marketing, Utc::now());
        let mut m = Milestone::new("m");
        m.assigned_to = Some(c.id);
        assigned.milestones.push(m);
        assert!(!filter.matches(&same_dept));
        assert!(filter.matches(&assigned));
    }

    #[test]
    fn test_summarise() {
        assert_eq!(summarise(&Vec::<Task>::new()), AnalyticsSummary::default());
        let mut tasks: Vec<Task> = (0..3).map(|i| Task::new(format!("t{i}"), Department::Finance, Utc::now())).collect();
        tasks[0].status = TaskStatus::Completed;
        let s = summarise(&tasks);
        assert_eq!(s, AnalyticsSummary { total_tasks: 3, completed_tasks: 1, completion_rate: 33 });
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["completionRate"], 33);
    }
}
