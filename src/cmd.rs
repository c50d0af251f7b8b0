//! Command implementations for the CLI interface.
//!
//! Each `cmd_*` handler resolves the caller's identity, turns command-line
//! references (task titles, short ids, emails) into ids, calls into the
//! [`Tracker`] and prints the result as a table or as JSON.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{Pbkdf2Hasher, TokenIssuer};
use crate::config::Config;
use crate::db::FileStore;
use crate::due::parse_due_input;
use crate::error::{Result, TrackerError};
use crate::fields::*;
use crate::service::{NewUser, TaskQuery, Tracker, UserPatch};
use crate::task::*;
use crate::user::{Identity, UserId, UserSummary};
use crate::view::*;

#[derive(Subcommand)]
pub enum Commands {
    /// Create the first creator account. Only works while no creator exists.
    Bootstrap {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Display name. Defaults to "System Creator".
        #[arg(long)]
        name: Option<String>,
    },

    /// Log in and save a session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Forget the saved session token.
    Logout,

    /// Show the identity behind the current token.
    Whoami,

    /// Manage user accounts (creator only).
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Create, list, view, update and delete tasks.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Work with the milestones of a task.
    Milestone {
        #[command(subcommand)]
        action: MilestoneAction,
    },

    /// Task completion summary over the tasks you can see.
    Analytics,

    /// Export visible tasks to CSV.
    Export {
        /// Output file path. Defaults to tasks.csv.
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user.
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
        /// creator | admin | hod | project_lead | staff | contract. Defaults to staff.
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// List all users.
    List,
    /// Change a user's name, role or department.
    Update {
        /// User ID or email.
        user: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, conflicts_with = "clear_department")]
        department: Option<String>,
        #[arg(long)]
        clear_department: bool,
    },
    /// Set a new password for a user.
    Passwd {
        /// User ID or email.
        user: String,
        #[arg(long)]
        password: String,
    },
    /// Delete a user.
    Rm {
        /// User ID or email.
        user: String,
    },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task.
    Add {
        title: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        desc: Option<String>,
        /// Deadline: YYYY-MM-DD, "today", "tomorrow", a weekday, or "in Nd".
        #[arg(long)]
        deadline: Option<String>,
        /// Assignee ID or email. May be repeated.
        #[arg(long = "assign")]
        assign: Vec<String>,
        /// Milestone title. May be repeated; order is kept.
        #[arg(long = "milestone")]
        milestones: Vec<String>,
    },
    /// List visible tasks.
    List {
        /// not-started | in-progress | completed
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        department: Option<String>,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// View a task by ID, short ID or title.
    View { task: String },
    /// Update task fields.
    Update {
        task: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long, conflicts_with = "clear_deadline")]
        deadline: Option<String>,
        #[arg(long)]
        clear_deadline: bool,
        /// Replace the assignee list. May be repeated.
        #[arg(long = "assign", conflicts_with = "clear_assignees")]
        assign: Vec<String>,
        #[arg(long)]
        clear_assignees: bool,
    },
    /// Delete a task.
    Rm { task: String },
}

#[derive(Subcommand)]
pub enum MilestoneAction {
    /// Append a milestone to a task.
    Add {
        task: String,
        title: String,
        /// Assignee ID or email.
        #[arg(long, conflicts_with = "department")]
        user: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Replace all milestones from a JSON array file ("-" reads stdin).
    Set {
        task: String,
        #[arg(long)]
        from: String,
    },
    /// Assign a milestone to a user or a department.
    Assign {
        task: String,
        /// Milestone position (1-based) or ID.
        milestone: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Mark a milestone done.
    Tick { task: String, milestone: String },
    /// Return a done milestone to Not Done.
    Untick { task: String, milestone: String },
}

/// Everything a command needs: configuration, the tracker and the caller's token.
pub struct App {
    pub config: Config,
    pub tracker: Tracker<FileStore, Pbkdf2Hasher>,
    pub issuer: TokenIssuer,
    pub token: Option<String>,
    pub json: bool,
}

impl App {
    pub fn new(config: Config, token: Option<String>, json: bool) -> Result<Self> {
        let tracker = Tracker::new(FileStore::new(&config.db_path), Pbkdf2Hasher::new(config.hash_rounds));
        let issuer = TokenIssuer::new(config.token_secret.clone(), config.token_ttl)?;
        debug!(db = %tracker.store().path().display(), "store opened");
        Ok(App {
            config,
            tracker,
            issuer,
            token: token.filter(|t| !t.trim().is_empty()),
            json,
        })
    }

    /// Verify the explicit token, or the saved session if none was given.
    pub fn identity(&self) -> Result<Identity> {
        let token = match &self.token {
            Some(t) => t.clone(),
            None => read_session(&self.config.session_path())?
                .ok_or_else(|| TrackerError::unauthenticated("not logged in; run `dt login`"))?,
        };
        let claims = self.issuer.verify(&token, Utc::now())?;
        Ok(claims.identity())
    }

    fn emit<T: Serialize>(&self, value: &T, table: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            table(value);
        }
        Ok(())
    }

    fn emit_task(&self, task: &Task) -> Result<()> {
        let view = self.tracker.task_views(std::slice::from_ref(task))?;
        self.emit(&view[0], print_task)
    }

    fn resolve_task(&self, actor: &Identity, identifier: &str) -> Result<TaskId> {
        if let Ok(id) = Uuid::parse_str(identifier.trim()) {
            return Ok(id);
        }
        let visible = self.tracker.list_tasks(actor, TaskQuery::default())?;
        resolve_task_identifier(identifier, &visible)
    }

    fn resolve_user(&self, identifier: &str) -> Result<UserId> {
        if let Ok(id) = Uuid::parse_str(identifier.trim()) {
            return Ok(id);
        }
        self.tracker
            .find_user_by_email(identifier)?
            .map(|u| u.id)
            .ok_or_else(|| TrackerError::not_found(format!("user '{}'", identifier.trim())))
    }

    fn resolve_users(&self, identifiers: &[String]) -> Result<Vec<UserId>> {
        identifiers.iter().map(|s| self.resolve_user(s)).collect()
    }
}

/// Resolve a task by short-id prefix or case-insensitive title among `tasks`.
pub fn resolve_task_identifier(identifier: &str, tasks: &[Task]) -> Result<TaskId> {
    let needle = identifier.trim().to_lowercase();
    if needle.is_empty() {
        return Err(TrackerError::validation("task identifier must not be empty"));
    }

    let by_prefix: Vec<&Task> = if needle.len() >= 4 && needle.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        tasks.iter().filter(|t| t.id.to_string().starts_with(&needle)).collect()
    } else {
        Vec::new()
    };
    let matches: Vec<&Task> = if by_prefix.is_empty() {
        tasks.iter().filter(|t| t.title.to_lowercase() == needle).collect()
    } else {
        by_prefix
    };

    match matches.as_slice() {
        [] => Err(TrackerError::not_found(format!("no task matching '{}'", identifier.trim()))),
        [one] => Ok(one.id),
        many => {
            let mut msg = format!("several tasks match '{}':\n", identifier.trim());
            for t in many {
                msg.push_str(&format!("  {}  {} [{}]\n", t.id, t.title, t.department));
            }
            msg.push_str("use the full ID instead");
            Err(TrackerError::validation(msg))
        }
    }
}

fn milestone_ref(s: &str) -> Result<MilestoneRef> {
    parse_milestone_ref(s).ok_or_else(|| {
        TrackerError::validation(format!("invalid milestone '{s}'; use a position like 2 or a milestone ID"))
    })
}

fn read_session(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_session(path: &Path, token: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, token)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn read_drafts(from: &str) -> Result<Vec<MilestoneDraft>> {
    let raw = if from == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(PathBuf::from(from))?
    };
    serde_json::from_str(&raw).map_err(|e| TrackerError::validation(format!("invalid milestone list: {e}")))
}

fn parse_deadline(s: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    let today = Local::now().date_naive();
    s.map(|d| parse_due_input(d, today)).transpose()
}

pub fn cmd_bootstrap(app: &mut App, email: String, password: String, name: Option<String>) -> Result<()> {
    let user = app.tracker.bootstrap_creator(name, &email, &password)?;
    app.emit(&user, |u| println!("Created creator account {} ({}).", u.email, u.id))
}

pub fn cmd_login(app: &mut App, email: String, password: String) -> Result<()> {
    let user = app.tracker.login(&email, &password)?;
    let token = app.issuer.issue(&user, Utc::now())?;
    write_session(&app.config.session_path(), &token)?;
    info!(user = %user.id, "session saved");

    #[derive(Serialize)]
    struct LoginOutput {
        token: String,
        user: UserSummary,
    }
    let out = LoginOutput {
        token,
        user: UserSummary::from(&user),
    };
    app.emit(&out, |o| {
        println!("Logged in as {} ({}, {}).", o.user.email, o.user.role, describe_department(o.user.department))
    })
}

pub fn cmd_logout(app: &App) -> Result<()> {
    let path = app.config.session_path();
    match fs::remove_file(&path) {
        Ok(()) => println!("Logged out."),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => println!("No saved session."),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn cmd_whoami(app: &App) -> Result<()> {
    let me = app.identity()?;
    app.emit(&me, |me| {
        println!("ID:          {}", me.id);
        println!("Email:       {}", me.email);
        println!("Name:        {}", if me.name.is_empty() { "-" } else { &me.name });
        println!("Role:        {}", me.role);
        println!("Department:  {}", describe_department(me.department));
    })
}

fn describe_department(d: Option<Department>) -> &'static str {
    d.map(format_department).unwrap_or("-")
}

pub fn cmd_user(app: &mut App, action: UserAction) -> Result<()> {
    let me = app.identity()?;
    match action {
        UserAction::Add { email, password, name, role, department } => {
            let user = app.tracker.register_user(
                &me,
                NewUser {
                    name,
                    email,
                    password,
                    role,
                    department,
                },
            )?;
            app.emit(&user, |u| println!("Registered {} as {}.", u.email, u.role))
        }
        UserAction::List => {
            let users = app.tracker.list_users(&me)?;
            app.emit(&users, |u| print_users(u))
        }
        UserAction::Update { user, name, role, department, clear_department } => {
            let id = app.resolve_user(&user)?;
            let department = if clear_department { Some(None) } else { department.map(Some) };
            let patch = UserPatch { name, role, department };
            let user = app.tracker.update_user(&me, id, patch)?;
            app.emit(&user, |u| print_users(std::slice::from_ref(u)))
        }
        UserAction::Passwd { user, password } => {
            let id = app.resolve_user(&user)?;
            let user = app.tracker.set_password(&me, id, &password)?;
            app.emit(&user, |u| println!("Password updated for {}.", u.email))
        }
        UserAction::Rm { user } => {
            let id = app.resolve_user(&user)?;
            app.tracker.delete_user(&me, id)?;
            println!("Deleted user {id}.");
            Ok(())
        }
    }
}

pub fn cmd_task(app: &mut App, action: TaskAction) -> Result<()> {
    let me = app.identity()?;
    match action {
        TaskAction::Add { title, department, desc, deadline, assign, milestones } => {
            let new = NewTask {
                title,
                description: desc,
                department,
                deadline: parse_deadline(deadline.as_deref())?,
                assigned_to: app.resolve_users(&assign)?,
                milestones: milestones.into_iter().map(MilestoneDraft::titled).collect(),
            };
            let task = app.tracker.create_task(&me, new)?;
            if !app.json {
                println!("Created task {} ({}).", task.id, task.title);
            }
            app.emit_task(&task)
        }
        TaskAction::List { status, department, limit } => {
            let query = TaskQuery {
                status: status.as_deref().map(parse_task_status).transpose()?,
                department: department.as_deref().map(parse_department).transpose()?,
            };
            let mut tasks = app.tracker.list_tasks(&me, query)?;
            if let Some(n) = limit {
                tasks.truncate(n);
            }
            let views = app.tracker.task_views(&tasks)?;
            app.emit(&views, |v| {
                if v.is_empty() {
                    println!("No tasks.");
                } else {
                    print_table(v);
                }
            })
        }
        TaskAction::View { task } => {
            let id = app.resolve_task(&me, &task)?;
            let task = app.tracker.get_task(&me, id)?;
            app.emit_task(&task)
        }
        TaskAction::Update {
            task,
            title,
            desc,
            department,
            deadline,
            clear_deadline,
            assign,
            clear_assignees,
        } => {
            let id = app.resolve_task(&me, &task)?;
            let deadline = if clear_deadline {
                Some(None)
            } else {
                parse_deadline(deadline.as_deref())?.map(Some)
            };
            let assigned_to = if clear_assignees {
                Some(Vec::new())
            } else if assign.is_empty() {
                None
            } else {
                Some(app.resolve_users(&assign)?)
            };
            let patch = TaskPatch {
                title,
                description: desc,
                department,
                deadline,
                assigned_to,
                milestones: None,
            };
            let task = app.tracker.update_task(&me, id, patch)?;
            app.emit_task(&task)
        }
        TaskAction::Rm { task } => {
            let id = app.resolve_task(&me, &task)?;
            app.tracker.delete_task(&me, id)?;
            println!("Deleted task {id}.");
            Ok(())
        }
    }
}

pub fn cmd_milestone(app: &mut App, action: MilestoneAction) -> Result<()> {
    let me = app.identity()?;
    let task = match action {
        MilestoneAction::Add { task, title, user, department } => {
            let id = app.resolve_task(&me, &task)?;
            let draft = MilestoneDraft {
                assigned_to: user.as_deref().map(|u| app.resolve_user(u)).transpose()?,
                assigned_department: department.as_deref().map(parse_department).transpose()?,
                ..MilestoneDraft::titled(title)
            };
            app.tracker.add_milestone(&me, id, draft)?
        }
        MilestoneAction::Set { task, from } => {
            let id = app.resolve_task(&me, &task)?;
            let drafts = read_drafts(&from)?;
            debug!(task = %id, count = drafts.len(), "replacing milestones");
            app.tracker.replace_milestones(&me, id, drafts)?
        }
        MilestoneAction::Assign { task, milestone, user, department } => {
            let id = app.resolve_task(&me, &task)?;
            let assignment = MilestoneAssignment {
                assigned_to: user.as_deref().map(|u| app.resolve_user(u)).transpose()?,
                assigned_department: department,
            };
            app.tracker.assign_milestone(&me, id, milestone_ref(&milestone)?, assignment)?
        }
        MilestoneAction::Tick { task, milestone } => {
            let id = app.resolve_task(&me, &task)?;
            app.tracker.tick_milestone(&me, id, milestone_ref(&milestone)?)?
        }
        MilestoneAction::Untick { task, milestone } => {
            let id = app.resolve_task(&me, &task)?;
            app.tracker.untick_milestone(&me, id, milestone_ref(&milestone)?)?
        }
    };
    if !app.json {
        println!(
            "{}: {}/{} milestones done, {}% ({}).",
            task.title,
            task.done_count(),
            task.milestones.len(),
            task.progress,
            task.status
        );
    }
    app.emit_task(&task)
}

pub fn cmd_analytics(app: &App) -> Result<()> {
    let me = app.identity()?;
    let summary = app.tracker.analytics(&me)?;
    app.emit(&summary, print_analytics)
}

pub fn cmd_export(app: &App, output: Option<String>) -> Result<()> {
    let me = app.identity()?;
    let output_path = output.unwrap_or_else(|| "tasks.csv".to_string());
    let tasks = app.tracker.list_tasks(&me, TaskQuery::default())?;
    let views = app.tracker.task_views(&tasks)?;
    fs::write(&output_path, tasks_to_csv(&views))?;
    println!("Exported {} task(s) to {}", views.len(), output_path);
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str) -> Task {
        Task::new(title, Department::Finance, Utc::now())
    }

    #[test]
    fn test_resolve_by_title_case_insensitive() {
        let tasks = vec![task("Quarterly Budget"), task("Audit")];
        assert_eq!(resolve_task_identifier("quarterly budget", &tasks).unwrap(), tasks[0].id);
        assert_eq!(resolve_task_identifier("  AUDIT ", &tasks).unwrap(), tasks[1].id);
    }

    #[test]
    fn test_resolve_by_short_id() {
        let tasks = vec![task("a"), task("b")];
        let prefix: String = tasks[1].id.to_string().chars().take(8).collect();
        assert_eq!(resolve_task_identifier(&prefix, &tasks).unwrap(), tasks[1].id);
    }

    #[test]
    fn test_resolve_missing_and_ambiguous() {
        let tasks = vec![task("Audit"), task("audit")];
        assert!(matches!(resolve_task_identifier("Payroll", &tasks), Err(TrackerError::NotFound(_))));
        match resolve_task_identifier("audit", &tasks) {
            Err(TrackerError::Validation(msg)) => {
                assert!(msg.contains(&tasks[0].id.to_string()));
                assert!(msg.contains(&tasks[1].id.to_string()));
            }
            other => panic!("expected ambiguity error, got {other:?}"),
        }
        assert!(matches!(resolve_task_identifier("  ", &tasks), Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_milestone_ref_errors_are_validation() {
        assert_eq!(milestone_ref("2").unwrap(), MilestoneRef::Position(2));
        assert!(matches!(milestone_ref("zero"), Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session");
        assert_eq!(read_session(&path).unwrap(), None);
        write_session(&path, "v1.abc.def\n").unwrap();
        assert_eq!(read_session(&path).unwrap().as_deref(), Some("v1.abc.def"));
    }
}
