//! Task records.
//!
//! A task is an insertion-ordered mapping from attribute name to attribute
//! value. Two attributes are privileged: `uuid` carries the identity of the
//! logical task, and `modified` carries the last-mutation timestamp in
//! seconds since the epoch (with `end`, `start`, `entry` as fallbacks for
//! records written by old clients).

use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::duration;

/// Task lifecycle states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Pending,
    Completed,
    Deleted,
    Recurring,
    Waiting,
}

impl Status {
    /// Parse a status value. Only the first letter is significant; anything
    /// unrecognized (including the empty string) is `Pending`.
    pub fn from_text(input: &str) -> Self {
        match input.as_bytes().first() {
            Some(b'p') => Status::Pending,
            Some(b'c') => Status::Completed,
            Some(b'd') => Status::Deleted,
            Some(b'r') => Status::Recurring,
            Some(b'w') => Status::Waiting,
            _ => Status::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
            Status::Deleted => "deleted",
            Status::Recurring => "recurring",
            Status::Waiting => "waiting",
        }
    }
}

/// An inconsistency validation could not repair.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    #[error("A task must have a description.")]
    MissingDescription,
    #[error("Cannot add a task that is blank.")]
    BlankDescription,
    #[error("A recurring task must also have a 'due' date.")]
    RecurrenceWithoutDue,
    #[error("The recurrence value '{0}' is not valid.")]
    InvalidRecurrence(String),
    #[error("Priority values may be 'H', 'M' or 'L', not '{0}'.")]
    InvalidPriority(String),
}

/// One task record.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Task {
    attributes: IndexMap<String, String>,
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Set an attribute, keeping its original position when it already
    /// exists and appending otherwise.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Remove an attribute. Order of the remaining attributes is preserved.
    pub fn remove(&mut self, name: &str) {
        self.attributes.shift_remove(name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.get("uuid")
    }

    /// Read an attribute as an epoch timestamp. Missing or non-numeric
    /// values are 0, matching the lenient reading old logs require.
    pub fn date(&self, name: &str) -> u64 {
        self.get(name)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// The last-mutation time: `modified` when present, otherwise the best
    /// of `end`, `start`, `entry` (records from clients predating the
    /// `modified` attribute).
    pub fn last_modification(&self) -> u64 {
        if self.has("modified") {
            self.date("modified")
        } else if self.has("end") {
            self.date("end")
        } else if self.has("start") {
            self.date("start")
        } else {
            self.date("entry")
        }
    }

    pub fn status(&self) -> Status {
        Status::from_text(self.get("status").unwrap_or(""))
    }

    pub fn set_status(&mut self, status: Status) {
        self.set("status", status.as_str());
    }

    /// Repair what can be repaired and reject what cannot.
    ///
    /// Provides a minted `uuid` and a derived `status` where they are
    /// missing, then rejects tasks with no description, a recurrence
    /// without a due date or with an unparseable period, or an unknown
    /// priority.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        let mut status = self.status();

        if !self.has("uuid") {
            self.set("uuid", Uuid::new_v4().to_string());
        }

        // Recurring tasks and waiting tasks get a special status.
        if status == Status::Pending
            && self.has("due")
            && self.has("recur")
            && !self.has("parent")
        {
            status = Status::Recurring;
        } else if status == Status::Pending && self.has("wait") {
            status = Status::Waiting;
        }

        self.set_status(status);

        match self.get("description") {
            None => return Err(ValidationError::MissingDescription),
            Some("") => return Err(ValidationError::BlankDescription),
            Some(_) => {}
        }

        if let Some(recur) = self.get("recur") {
            if !self.has("due") {
                return Err(ValidationError::RecurrenceWithoutDue);
            }
            if !duration::valid(recur) {
                return Err(ValidationError::InvalidRecurrence(recur.to_string()));
            }
        }

        if let Some(priority) = self.get("priority") {
            if !matches!(priority, "H" | "M" | "L") {
                return Err(ValidationError::InvalidPriority(priority.to_string()));
            }
        }

        Ok(())
    }
}

impl FromIterator<(String, String)> for Task {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}
