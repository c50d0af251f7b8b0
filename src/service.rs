//! Operations on users and tasks, gated by the permission rules.
//!
//! Every task mutation is a read-modify-write of one task document committed
//! with [`Store::replace_task`] against the version that was read. Validation
//! happens on a private copy, so a rejected update never reaches the store.
//! On a version conflict the whole operation is re-run against a fresh read.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::auth::{PasswordHasher, Pbkdf2Hasher};
use crate::db::Store;
use crate::error::{Result, TrackerError};
use crate::fields::*;
use crate::permissions::*;
use crate::scope::{summarise, task_visibility_filter, AnalyticsSummary};
use crate::task::*;
use crate::user::{normalise_email, Identity, User, UserId, UserSummary};
use crate::view::{task_view, TaskView};

/// Attempts made for one task mutation before a conflict is reported.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

const BOOTSTRAP_NAME: &str = "System Creator";

/// Fields for registering a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub role: Option<String>,
    /// `Some(None)` clears the department.
    pub department: Option<Option<String>>,
}

/// Optional narrowing applied after visibility scoping.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub department: Option<Department>,
}

/// The tracker: a store plus a password hasher.
#[derive(Debug)]
pub struct Tracker<S, H = Pbkdf2Hasher> {
    store: S,
    hasher: H,
}

impl<S: Store, H: PasswordHasher> Tracker<S, H> {
    pub fn new(store: S, hasher: H) -> Self {
        Tracker { store, hasher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Create the first creator account. Disabled once any creator exists.
    pub fn bootstrap_creator(&mut self, name: Option<String>, email: &str, password: &str) -> Result<UserSummary> {
        if self.store.any_user_with_role(Role::Creator)? {
            return Err(TrackerError::forbidden("bootstrap disabled: a creator already exists"));
        }
        let email = validate_email(email)?;
        validate_password(password)?;
        let user = User {
            id: uuid::Uuid::new_v4(),
            name: name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| BOOTSTRAP_NAME.to_string()),
            email,
            password_hash: self.hasher.hash(password)?,
            role: Role::Creator,
            department: Some(Department::Management),
        };
        let summary = UserSummary::from(&user);
        self.store.insert_user(user)?;
        info!(user = %summary.id, email = %summary.email, "bootstrap creator created");
        Ok(summary)
    }

    /// Check credentials and return the matching user.
    pub fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = self.store.find_user_by_email(&normalise_email(email))?;
        match user {
            Some(u) if self.hasher.verify(password, &u.password_hash) => {
                info!(user = %u.id, "login succeeded");
                Ok(u)
            }
            _ => {
                debug!(email = %normalise_email(email), "login rejected");
                Err(TrackerError::unauthenticated("invalid credentials"))
            }
        }
    }

    fn require_user_manager(&self, actor: &Identity) -> Result<()> {
        if can_manage_users(actor) {
            Ok(())
        } else {
            Err(TrackerError::forbidden("only creators may manage users"))
        }
    }

    pub fn register_user(&mut self, actor: &Identity, new: NewUser) -> Result<UserSummary> {
        self.require_user_manager(actor)?;
        let email = validate_email(&new.email)?;
        validate_password(&new.password)?;
        let role = new.role.as_deref().map(parse_role).transpose()?.unwrap_or(Role::Staff);
        let department = new
            .department
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(parse_department)
            .transpose()?;
        validate_role_department(role, department)?;

        let user = User {
            id: uuid::Uuid::new_v4(),
            name: new.name.map(|n| n.trim().to_string()).unwrap_or_default(),
            email,
            password_hash: self.hasher.hash(&new.password)?,
            role,
            department,
        };
        let summary = UserSummary::from(&user);
        self.store.insert_user(user)?;
        info!(actor = %actor.id, user = %summary.id, role = %role, "user registered");
        Ok(summary)
    }

    pub fn list_users(&self, actor: &Identity) -> Result<Vec<UserSummary>> {
        self.require_user_manager(actor)?;
        let mut users: Vec<UserSummary> = self.store.list_users()?.iter().map(UserSummary::from).collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserSummary>> {
        Ok(self.store.find_user_by_email(email)?.as_ref().map(UserSummary::from))
    }

    fn load_user(&self, id: UserId) -> Result<User> {
        self.store
            .find_user(id)?
            .ok_or_else(|| TrackerError::not_found(format!("user {id}")))
    }

    pub fn update_user(&mut self, actor: &Identity, id: UserId, patch: UserPatch) -> Result<UserSummary> {
        self.require_user_manager(actor)?;
        let mut user = self.load_user(id)?;
        if let Some(name) = patch.name {
            user.name = name.trim().to_string();
        }
        if let Some(role) = patch.role.as_deref() {
            let role = parse_role(role)?;
            if id == actor.id && role != Role::Creator {
                return Err(TrackerError::invalid_state("cannot remove the creator role from yourself"));
            }
            user.role = role;
        }
        if let Some(department) = patch.department {
            user.department = department
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .map(parse_department)
                .transpose()?;
        }
        validate_role_department(user.role, user.department)?;
        let summary = UserSummary::from(&user);
        self.store.replace_user(user)?;
        info!(actor = %actor.id, user = %id, "user updated");
        Ok(summary)
    }

    pub fn set_password(&mut self, actor: &Identity, id: UserId, new_password: &str) -> Result<UserSummary> {
        self.require_user_manager(actor)?;
        validate_password(new_password)?;
        let mut user = self.load_user(id)?;
        user.password_hash = self.hasher.hash(new_password)?;
        let summary = UserSummary::from(&user);
        self.store.replace_user(user)?;
        info!(actor = %actor.id, user = %id, "password reset");
        Ok(summary)
    }

    pub fn delete_user(&mut self, actor: &Identity, id: UserId) -> Result<()> {
        self.require_user_manager(actor)?;
        if id == actor.id {
            return Err(TrackerError::invalid_state("cannot delete your own account"));
        }
        if !self.store.delete_user(id)? {
            return Err(TrackerError::not_found(format!("user {id}")));
        }
        info!(actor = %actor.id, user = %id, "user deleted");
        Ok(())
    }

    fn require_users_exist(&self, ids: &[UserId]) -> Result<()> {
        for &id in ids {
            if self.store.find_user(id)?.is_none() {
                return Err(TrackerError::not_found(format!("assigned user {id}")));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Tasks visible to `actor`, soonest deadline first.
    pub fn list_tasks(&self, actor: &Identity, query: TaskQuery) -> Result<Vec<Task>> {
        let filter = task_visibility_filter(actor);
        let mut tasks: Vec<Task> = self
            .store
            .find_tasks(&filter)?
            .into_iter()
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .filter(|t| query.department.map_or(true, |d| t.department == d))
            .collect();
        tasks.sort_by_key(|t| (t.deadline.unwrap_or(chrono::NaiveDate::MAX), t.created_at));
        debug!(actor = %actor.id, ?filter, count = tasks.len(), "tasks listed");
        Ok(tasks)
    }

    fn load_task(&self, id: TaskId) -> Result<Task> {
        self.store
            .find_task(id)?
            .ok_or_else(|| TrackerError::not_found(format!("task {id}")))
    }

    pub fn get_task(&self, actor: &Identity, id: TaskId) -> Result<Task> {
        let task = self.load_task(id)?;
        require_visible(actor, &task)?;
        Ok(task)
    }

    pub fn analytics(&self, actor: &Identity) -> Result<AnalyticsSummary> {
        if !can_view_analytics(actor) {
            return Err(TrackerError::forbidden("analytics not available for this role"));
        }
        let tasks = self.store.find_tasks(&task_visibility_filter(actor))?;
        Ok(summarise(&tasks))
    }

    /// Resolve user references for output.
    pub fn task_views(&self, tasks: &[Task]) -> Result<Vec<TaskView>> {
        let users = self.store.list_users()?;
        Ok(tasks.iter().map(|t| task_view(t, &users)).collect())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn create_task(&mut self, actor: &Identity, new: NewTask) -> Result<Task> {
        let department = parse_department(&new.department)?;
        let title = validate_title(&new.title)?;
        if !can_create_or_delete_task(actor, department) {
            return Err(TrackerError::forbidden(format!(
                "{} may not create tasks in {}",
                actor.role, department
            )));
        }
        let assigned_to = dedup_ids(new.assigned_to);
        self.require_users_exist(&assigned_to)?;

        let now = self.now();
        let mut task = Task::new(title, department, now);
        task.description = new.description.unwrap_or_default();
        task.deadline = new.deadline;
        task.assigned_to = assigned_to;
        task.milestones = self.build_milestones(actor, &[], new.milestones, now)?;
        task.refresh_progress();

        self.store.insert_task(task.clone())?;
        info!(actor = %actor.id, task = %task.id, department = %department, "task created");
        Ok(task)
    }

    /// Apply a partial update. When milestones are part of the patch the
    /// whole sequence is replaced and progress is recomputed.
    pub fn update_task(&mut self, actor: &Identity, id: TaskId, patch: TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(TrackerError::validation("nothing to update"));
        }
        let new_department = patch.department.as_deref().map(parse_department).transpose()?;
        let new_title = patch.title.as_deref().map(validate_title).transpose()?;
        let new_assignees = patch.assigned_to.clone().map(dedup_ids);
        if let Some(ids) = &new_assignees {
            self.require_users_exist(ids)?;
        }

        let updated = self.mutate_task(id, |tracker, task, now| {
            require_visible(actor, task)?;
            if !can_edit_task(actor, task) {
                return Err(TrackerError::forbidden("not allowed to edit this task"));
            }
            if let Some(dept) = new_department {
                if dept != task.department && !can_create_or_delete_task(actor, dept) {
                    return Err(TrackerError::forbidden(format!("may not move tasks into {dept}")));
                }
            }
            if patch.milestones.is_some() && !can_edit_milestones(actor, task) {
                return Err(TrackerError::forbidden("not allowed to edit milestones"));
            }

            if let Some(title) = &new_title {
                task.title = title.clone();
            }
            if let Some(description) = &patch.description {
                task.description = description.clone();
            }
            if let Some(dept) = new_department {
                task.department = dept;
            }
            if let Some(deadline) = patch.deadline {
                task.deadline = deadline;
            }
            if let Some(ids) = &new_assignees {
                task.assigned_to = ids.clone();
            }
            if let Some(drafts) = &patch.milestones {
                task.milestones = tracker.build_milestones(actor, &task.milestones, drafts.clone(), now)?;
            }
            task.refresh_progress();
            Ok(())
        })?;
        info!(actor = %actor.id, task = %id, milestones = patch.milestones.is_some(), "task updated");
        Ok(updated)
    }

    /// Replace the whole milestone sequence in one write.
    pub fn replace_milestones(&mut self, actor: &Identity, id: TaskId, drafts: Vec<MilestoneDraft>) -> Result<Task> {
        let patch = TaskPatch {
            milestones: Some(drafts),
            ..TaskPatch::default()
        };
        self.update_task(actor, id, patch)
    }

    pub fn add_milestone(&mut self, actor: &Identity, id: TaskId, draft: MilestoneDraft) -> Result<Task> {
        if draft.id.is_some() {
            return Err(TrackerError::validation("a new milestone cannot reuse an existing id"));
        }
        let updated = self.mutate_task(id, |tracker, task, now| {
            require_visible(actor, task)?;
            if !can_edit_milestones(actor, task) {
                return Err(TrackerError::forbidden("not allowed to edit milestones"));
            }
            let mut built = tracker.build_milestones(actor, &[], vec![draft.clone()], now)?;
            task.milestones.append(&mut built);
            task.refresh_progress();
            Ok(())
        })?;
        info!(actor = %actor.id, task = %id, "milestone added");
        Ok(updated)
    }

    /// Assign a milestone to exactly one of a user or a department.
    pub fn assign_milestone(
        &mut self,
        actor: &Identity,
        task_id: TaskId,
        milestone: MilestoneRef,
        assignment: MilestoneAssignment,
    ) -> Result<Task> {
        let updated = self.mutate_task(task_id, |tracker, task, _now| {
            require_visible(actor, task)?;
            if !can_edit_milestones(actor, task) {
                return Err(TrackerError::forbidden("not allowed to edit milestones"));
            }
            let idx = task
                .milestone_index(&milestone)
                .ok_or_else(|| TrackerError::not_found(format!("milestone {milestone}")))?;

            let department = assignment
                .assigned_department
                .as_deref()
                .filter(|d| !d.trim().is_empty());
            let m = &mut task.milestones[idx];
            match (assignment.assigned_to, department) {
                (Some(_), Some(_)) => {
                    return Err(TrackerError::validation("use assignedTo or assignedDepartment, not both"));
                }
                (None, None) => {
                    return Err(TrackerError::validation("assignedTo or assignedDepartment is required"));
                }
                (Some(user), None) => {
                    tracker.require_users_exist(&[user])?;
                    m.assigned_to = Some(user);
                    m.assigned_department = None;
                }
                (None, Some(dept)) => {
                    m.assigned_department = Some(parse_department(dept)?);
                    m.assigned_to = None;
                }
            }
            Ok(())
        })?;
        info!(actor = %actor.id, task = %task_id, milestone = %milestone, "milestone assigned");
        Ok(updated)
    }

    /// Mark a milestone done. Ticking a milestone that is already done is
    /// rejected with `InvalidState`.
    pub fn tick_milestone(&mut self, actor: &Identity, task_id: TaskId, milestone: MilestoneRef) -> Result<Task> {
        let updated = self.mutate_task(task_id, |_, task, now| {
            require_visible(actor, task)?;
            let idx = task
                .milestone_index(&milestone)
                .ok_or_else(|| TrackerError::not_found(format!("milestone {milestone}")))?;
            if !can_tick_milestone(actor, task, &task.milestones[idx]) {
                return Err(TrackerError::forbidden("not allowed to tick this milestone"));
            }
            if task.milestones[idx].is_done() {
                return Err(TrackerError::invalid_state("milestone already done"));
            }
            task.milestones[idx].complete(actor.id, now);
            task.refresh_progress();
            Ok(())
        })?;
        info!(
            actor = %actor.id,
            task = %task_id,
            milestone = %milestone,
            progress = updated.progress,
            "milestone ticked"
        );
        Ok(updated)
    }

    /// Return a done milestone to Not Done, clearing its completion record.
    /// Requires milestone-editing rights on the task.
    pub fn untick_milestone(&mut self, actor: &Identity, task_id: TaskId, milestone: MilestoneRef) -> Result<Task> {
        let updated = self.mutate_task(task_id, |_, task, _now| {
            require_visible(actor, task)?;
            if !can_edit_milestones(actor, task) {
                return Err(TrackerError::forbidden("not allowed to reopen milestones"));
            }
            let idx = task
                .milestone_index(&milestone)
                .ok_or_else(|| TrackerError::not_found(format!("milestone {milestone}")))?;
            if !task.milestones[idx].is_done() {
                return Err(TrackerError::invalid_state("milestone is not done"));
            }
            task.milestones[idx].reopen();
            task.refresh_progress();
            Ok(())
        })?;
        info!(actor = %actor.id, task = %task_id, milestone = %milestone, "milestone reopened");
        Ok(updated)
    }

    pub fn delete_task(&mut self, actor: &Identity, id: TaskId) -> Result<()> {
        let task = self.load_task(id)?;
        if !can_create_or_delete_task(actor, task.department) {
            return Err(TrackerError::forbidden(format!(
                "{} may not delete tasks in {}",
                actor.role, task.department
            )));
        }
        if !self.store.delete_task(id)? {
            return Err(TrackerError::not_found(format!("task {id}")));
        }
        info!(actor = %actor.id, task = %id, "task deleted");
        Ok(())
    }

    /// Read the task, let `apply` change a copy, and write it back if the
    /// stored version is still the one read. Retries on conflict.
    fn mutate_task<F>(&mut self, id: TaskId, mut apply: F) -> Result<Task>
    where
        F: FnMut(&Self, &mut Task, DateTime<Utc>) -> Result<()>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.load_task(id)?;
            let now = self.now();
            let mut next = current.clone();
            apply(self, &mut next, now)?;
            next.updated_at = now;
            match self.store.replace_task(next, current.version) {
                Ok(saved) => return Ok(saved),
                Err(TrackerError::Conflict(msg)) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(task = %id, attempt, %msg, "write conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Turn caller drafts into milestones, keeping the completion record of
    /// existing milestones that stay done.
    fn build_milestones(
        &self,
        actor: &Identity,
        existing: &[Milestone],
        drafts: Vec<MilestoneDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Milestone>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let title = draft.title.trim();
            if title.is_empty() {
                return Err(TrackerError::validation("milestone title must not be empty"));
            }
            if draft.assigned_to.is_some() && draft.assigned_department.is_some() {
                return Err(TrackerError::validation(format!(
                    "milestone '{title}' has both assignedTo and assignedDepartment"
                )));
            }
            if let Some(user) = draft.assigned_to {
                self.require_users_exist(&[user])?;
            }

            let mut m = match draft.id {
                Some(id) => {
                    if !seen.insert(id) {
                        return Err(TrackerError::validation(format!("milestone {id} listed twice")));
                    }
                    existing
                        .iter()
                        .find(|m| m.id == id)
                        .cloned()
                        .ok_or_else(|| TrackerError::not_found(format!("milestone {id}")))?
                }
                None => Milestone::new(title),
            };
            m.title = title.to_string();
            m.assigned_to = draft.assigned_to;
            m.assigned_department = draft.assigned_department;
            match draft.status.unwrap_or(m.status) {
                MilestoneStatus::Done if !m.is_done() => m.complete(actor.id, now),
                MilestoneStatus::Done => {}
                MilestoneStatus::NotDone => m.reopen(),
            }
            out.push(m);
        }
        Ok(out)
    }
}

fn require_visible(actor: &Identity, task: &Task) -> Result<()> {
    if can_see_task(actor, task) {
        Ok(())
    } else {
        Err(TrackerError::forbidden("task not visible to you"))
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TrackerError::validation("title must not be empty"));
    }
    Ok(title.to_string())
}

fn validate_email(email: &str) -> Result<String> {
    let email = normalise_email(email);
    if email.is_empty() {
        return Err(TrackerError::validation("email is required"));
    }
    let well_formed = matches!(email.split_once('@'), Some((local, domain)) if !local.is_empty() && !domain.is_empty());
    if !well_formed {
        return Err(TrackerError::validation(format!("invalid email '{email}'")));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(TrackerError::validation("password is required"));
    }
    Ok(())
}

fn validate_role_department(role: Role, department: Option<Department>) -> Result<()> {
    if role.requires_department() && department.is_none() {
        return Err(TrackerError::validation(format!("role {role} requires a department")));
    }
    Ok(())
}

fn dedup_ids(ids: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
