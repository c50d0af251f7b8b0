//! Role-based access rules.
//!
//! Every function is a pure decision over the acting identity and the target
//! state. Each one matches on every [`Role`] without a wildcard arm, so a new
//! role cannot be added without deciding its access here. An identity with no
//! department never satisfies a department rule.

use crate::fields::{Department, Role};
use crate::task::{Milestone, Task};
use crate::user::Identity;

pub fn can_manage_users(actor: &Identity) -> bool {
    match actor.role {
        Role::Creator => true,
        Role::Admin | Role::Hod | Role::ProjectLead | Role::Staff | Role::Contract => false,
    }
}

pub fn can_view_analytics(actor: &Identity) -> bool {
    match actor.role {
        Role::Creator | Role::Admin | Role::ProjectLead | Role::Hod => true,
        Role::Staff | Role::Contract => false,
    }
}

pub fn can_see_task(actor: &Identity, task: &Task) -> bool {
    match actor.role {
        Role::Creator | Role::Admin | Role::ProjectLead => true,
        Role::Hod | Role::Staff => actor.in_department(task.department),
        Role::Contract => task.has_milestone_assigned_to(actor.id),
    }
}

pub fn can_create_or_delete_task(actor: &Identity, department: Department) -> bool {
    match actor.role {
        Role::Creator | Role::Admin | Role::ProjectLead => true,
        Role::Hod => actor.in_department(department),
        Role::Staff | Role::Contract => false,
    }
}

/// Editing the task's own fields (title, description, department, deadline,
/// task-level assignees).
pub fn can_edit_task(actor: &Identity, task: &Task) -> bool {
    match actor.role {
        Role::Creator | Role::Admin | Role::ProjectLead => true,
        Role::Hod => actor.in_department(task.department),
        Role::Staff | Role::Contract => false,
    }
}

pub fn can_edit_milestones(actor: &Identity, task: &Task) -> bool {
    match actor.role {
        Role::Creator | Role::Admin | Role::ProjectLead => true,
        Role::Hod => actor.in_department(task.department),
        Role::Staff | Role::Contract => false,
    }
}

pub fn can_tick_milestone(actor: &Identity, task: &Task, milestone: &Milestone) -> bool {
    match actor.role {
        Role::Creator | Role::Admin => true,
        Role::Hod => actor.in_department(task.department),
        Role::ProjectLead => milestone
            .assigned_department
            .is_some_and(|d| actor.in_department(d)),
        Role::Staff | Role::Contract => milestone.assigned_to == Some(actor.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use uuid::Uuid;

    fn actor(role: Role, department: Option<Department>) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            role,
            department,
            email: format!("{role}@example.org"),
            name: role.to_string(),
        }
    }

    fn finance_task() -> Task {
        let mut t = Task::new("Quarterly close", Department::Finance, Utc::now());
        t.milestones.push(Milestone::new("Reconcile"));
        t
    }

    #[rstest]
    #[case(Role::Creator, true)]
    #[case(Role::Admin, false)]
    #[case(Role::Hod, false)]
    #[case(Role::ProjectLead, false)]
    #[case(Role::Staff, false)]
    #[case(Role::Contract, false)]
    fn manage_users(#[case] role: Role, #[case] expected: bool) {
        assert_eq!(can_manage_users(&actor(role, Some(Department::Management))), expected);
    }

    #[rstest]
    #[case(Role::Creator, true)]
    #[case(Role::Admin, true)]
    #[case(Role::Hod, true)]
    #[case(Role::ProjectLead, true)]
    #[case(Role::Staff, false)]
    #[case(Role::Contract, false)]
    fn view_analytics(#[case] role: Role, #[case] expected: bool) {
        assert_eq!(can_view_analytics(&actor(role, Some(Department::Finance))), expected);
    }

    #[rstest]
    #[case(Role::Creator, Department::Marketing, true)]
    #[case(Role::Admin, Department::Marketing, true)]
    #[case(Role::ProjectLead, Department::Marketing, true)]
    #[case(Role::Hod, Department::Finance, true)]
    #[case(Role::Hod, Department::Marketing, false)]
    #[case(Role::Staff, Department::Finance, true)]
    #[case(Role::Staff, Department::Marketing, false)]
    #[case(Role::Contract, Department::Finance, false)]
    fn see_task_by_department(#[case] role: Role, #[case] dept: Department, #[case] expected: bool) {
        assert_eq!(can_see_task(&actor(role, Some(dept)), &finance_task()), expected);
    }

    #[test]
    fn test_contract_sees_only_assigned() {
        let a = actor(Role::Contract, Some(Department::ContractStaff));
        let mut t = finance_task();
        assert!(!can_see_task(&a, &t));
        t.milestones[0].assigned_to = Some(a.id);
        assert!(can_see_task(&a, &t));
    }

    #[test]
    fn test_scoped_roles_without_department_are_denied() {
        let t = finance_task();
        for role in [Role::Hod, Role::Staff] {
            let a = actor(role, None);
            assert!(!can_see_task(&a, &t));
            assert!(!can_edit_milestones(&a, &t));
            assert!(!can_create_or_delete_task(&a, Department::Finance));
        }
    }

    #[test]
    fn test_other_department_hod_and_staff_never_see_task() {
        for dept in Department::ALL.into_iter().filter(|d| *d != Department::Finance) {
            for role in [Role::Hod, Role::Staff] {
                assert!(!can_see_task(&actor(role, Some(dept)), &finance_task()));
            }
        }
    }

    #[rstest]
    #[case(Role::Creator, Department::Marketing, true)]
    #[case(Role::Admin, Department::Marketing, true)]
    #[case(Role::ProjectLead, Department::Marketing, true)]
    #[case(Role::Hod, Department::Finance, true)]
    #[case(Role::Hod, Department::Marketing, false)]
    #[case(Role::Staff, Department::Finance, false)]
    #[case(Role::Contract, Department::Finance, false)]
    fn create_or_delete(#[case] role: Role, #[case] actor_dept: Department, #[case] expected: bool) {
        assert_eq!(
            can_create_or_delete_task(&actor(role, Some(actor_dept)), Department::Finance),
            expected
        );
    }

    #[rstest]
    #[case(Role::Creator, Department::Marketing, true)]
    #[case(Role::Admin, Department::Marketing, true)]
    #[case(Role::ProjectLead, Department::Marketing, true)]
    #[case(Role::Hod, Department::Finance, true)]
    #[case(Role::Hod, Department::Marketing, false)]
    #[case(Role::Staff, Department::Finance, false)]
    #[case(Role::Contract, Department::Finance, false)]
    fn edit_task_and_milestones(#[case] role: Role, #[case] actor_dept: Department, #[case] expected: bool) {
        let a = actor(role, Some(actor_dept));
        let t = finance_task();
        assert_eq!(can_edit_task(&a, &t), expected);
        assert_eq!(can_edit_milestones(&a, &t), expected);
    }

    #[test]
    fn test_tick_rules() {
        let t = finance_task();
        let mut m = t.milestones[0].clone();

        assert!(can_tick_milestone(&actor(Role::Creator, None), &t, &m));
        assert!(can_tick_milestone(&actor(Role::Admin, None), &t, &m));
        assert!(can_tick_milestone(&actor(Role::Hod, Some(Department::Finance)), &t, &m));
        assert!(!can_tick_milestone(&actor(Role::Hod, Some(Department::Marketing)), &t, &m));

        let lead = actor(Role::ProjectLead, Some(Department::Marketing));
        assert!(!can_tick_milestone(&lead, &t, &m));
        m.assigned_department = Some(Department::Marketing);
        assert!(can_tick_milestone(&lead, &t, &m));

        let staff = actor(Role::Staff, Some(Department::Finance));
        let contractor = actor(Role::Contract, None);
        assert!(!can_tick_milestone(&staff, &t, &m));
        assert!(!can_tick_milestone(&contractor, &t, &m));
        m.assigned_department = None;
        m.assigned_to = Some(staff.id);
        assert!(can_tick_milestone(&staff, &t, &m));
        assert!(!can_tick_milestone(&contractor, &t, &m));
        m.assigned_to = Some(contractor.id);
        assert!(can_tick_milestone(&contractor, &t, &m));
    }
}
