//! Task model and field-patch types for the shared board.
//!
//! A [`Task`] carries a monotonically increasing `version` used for
//! optimistic concurrency control. Mutations are expressed as a [`TaskPatch`]:
//! a list of tagged [`TaskField`] values naming exactly the mutable fields,
//! validated before they reach the version check.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::UserId;

/// Maximum allowed task title length in characters.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum allowed task description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Returns the current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Board column a task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Todo,
    /// Actively being worked on.
    InProgress,
    /// Completed. Done tasks do not count towards a user's workload.
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "Todo"),
            Self::InProgress => write!(f, "In Progress"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Medium priority (the default).
    #[default]
    Medium,
    /// High priority.
    High,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// A task on the shared board.
///
/// `version` starts at 0 and grows by exactly one per accepted mutation.
/// `is_being_edited` and `edit_lock_holder` mirror the soft edit lock and
/// always agree: the holder is `Some` iff `is_being_edited` is `true`. Use
/// [`Task::set_edit_lock`] to change them together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier (UUID v7, never reused).
    pub id: TaskId,
    /// Short title, trimmed and non-empty.
    pub title: String,
    /// Free-form description, possibly empty.
    pub description: String,
    /// Current column.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// User the task is assigned to, if any.
    pub assigned_user: Option<UserId>,
    /// User who created the task.
    pub created_by: UserId,
    /// Optimistic concurrency version.
    pub version: u64,
    /// Whether some user holds the soft edit lock.
    pub is_being_edited: bool,
    /// Holder of the soft edit lock.
    pub edit_lock_holder: Option<UserId>,
    /// Optional due date in milliseconds since epoch.
    pub due_date: Option<u64>,
    /// Creation time in milliseconds since epoch.
    pub created_at: u64,
    /// Time of the last accepted mutation in milliseconds since epoch.
    pub updated_at: u64,
}

impl Task {
    /// Sets or clears the edit-lock mirror fields together.
    pub fn set_edit_lock(&mut self, holder: Option<UserId>) {
        self.is_being_edited = holder.is_some();
        self.edit_lock_holder = holder;
    }

    /// Returns `true` if the task counts towards its assignee's workload.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != TaskStatus::Done
    }
}

/// Errors raised when a task or patch fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title is empty or whitespace.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Title exceeds the maximum length.
    #[error("task title too long (max {MAX_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// Description exceeds the maximum length.
    #[error("task description too long (max {MAX_DESCRIPTION_LENGTH} characters)")]
    DescriptionTooLong,
    /// A patch with no fields.
    #[error("patch contains no fields")]
    EmptyPatch,
    /// The same field appears twice in one patch.
    #[error("field {0} appears more than once in the patch")]
    DuplicateField(TaskFieldKind),
    /// Assignee is not a user known to the directory.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
    /// A task with this id already exists.
    #[error("task already exists: {0}")]
    DuplicateTask(TaskId),
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    if description.trim().chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong);
    }
    Ok(())
}

/// Field set of a create request. Unset fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Required title.
    pub title: String,
    /// Optional description (defaults to empty).
    pub description: Option<String>,
    /// Initial status (defaults to [`TaskStatus::Todo`]).
    pub status: Option<TaskStatus>,
    /// Initial priority (defaults to [`TaskPriority::Medium`]).
    pub priority: Option<TaskPriority>,
    /// Initial assignee.
    pub assigned_user: Option<UserId>,
    /// Due date in milliseconds since epoch.
    pub due_date: Option<u64>,
}

impl NewTask {
    /// Creates a create request with only a title set.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Checks title and description constraints.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }

    /// Builds the version-0 task this request describes.
    #[must_use]
    pub fn into_task(self, id: TaskId, created_by: UserId, now: u64) -> Task {
        Task {
            id,
            title: self.title.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            assigned_user: self.assigned_user,
            created_by,
            version: 0,
            is_being_edited: false,
            edit_lock_holder: None,
            due_date: self.due_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Names of the mutable task fields, used for merge choices and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskFieldKind {
    /// `title`
    Title,
    /// `description`
    Description,
    /// `status`
    Status,
    /// `priority`
    Priority,
    /// `assigned_user`
    AssignedUser,
    /// `due_date`
    DueDate,
}

impl std::fmt::Display for TaskFieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::AssignedUser => "assigned_user",
            Self::DueDate => "due_date",
        };
        f.write_str(name)
    }
}

/// A new value for a single mutable task field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskField {
    /// Replace the title.
    Title(String),
    /// Replace the description.
    Description(String),
    /// Move to another column.
    Status(TaskStatus),
    /// Change the priority.
    Priority(TaskPriority),
    /// Assign to a user, or unassign with `None`.
    AssignedUser(Option<UserId>),
    /// Set or clear the due date.
    DueDate(Option<u64>),
}

impl TaskField {
    /// Returns which field this value targets.
    #[must_use]
    pub const fn kind(&self) -> TaskFieldKind {
        match self {
            Self::Title(_) => TaskFieldKind::Title,
            Self::Description(_) => TaskFieldKind::Description,
            Self::Status(_) => TaskFieldKind::Status,
            Self::Priority(_) => TaskFieldKind::Priority,
            Self::AssignedUser(_) => TaskFieldKind::AssignedUser,
            Self::DueDate(_) => TaskFieldKind::DueDate,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Title(title) => validate_title(title),
            Self::Description(description) => validate_description(description),
            _ => Ok(()),
        }
    }

    fn apply(&self, task: &mut Task) {
        match self {
            Self::Title(title) => task.title = title.trim().to_string(),
            Self::Description(description) => task.description = description.trim().to_string(),
            Self::Status(status) => task.status = *status,
            Self::Priority(priority) => task.priority = *priority,
            Self::AssignedUser(user) => task.assigned_user.clone_from(user),
            Self::DueDate(due) => task.due_date = *due,
        }
    }
}

/// A partial update: each listed field is replaced, everything else is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    fields: Vec<TaskField>,
}

impl TaskPatch {
    /// Creates an empty patch.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Returns the patch with `field` appended.
    #[must_use]
    pub fn with(mut self, field: TaskField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the fields of this patch in submission order.
    #[must_use]
    pub fn fields(&self) -> &[TaskField] {
        &self.fields
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the new assignee if this patch changes the assignment.
    #[must_use]
    pub fn assignee(&self) -> Option<Option<&UserId>> {
        self.fields.iter().find_map(|field| match field {
            TaskField::AssignedUser(user) => Some(user.as_ref()),
            _ => None,
        })
    }

    /// Returns a patch keeping only the fields whose kind satisfies `keep`.
    #[must_use]
    pub fn retain(&self, keep: impl Fn(TaskFieldKind) -> bool) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|field| keep(field.kind()))
                .cloned()
                .collect(),
        }
    }

    /// Checks that the patch is non-empty, names each field at most once,
    /// and that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fields.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }
        let mut seen = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let kind = field.kind();
            if seen.contains(&kind) {
                return Err(ValidationError::DuplicateField(kind));
            }
            seen.push(kind);
            field.validate()?;
        }
        Ok(())
    }

    /// Writes every field of the patch into `task`.
    ///
    /// Does not touch `version` or timestamps; the store owns those.
    pub fn apply(&self, task: &mut Task) {
        for field in &self.fields {
            field.apply(task);
        }
    }
}

impl From<TaskField> for TaskPatch {
    fn from(field: TaskField) -> Self {
        Self::new().with(field)
    }
}
