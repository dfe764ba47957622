//! The agent's task list.
//!
//! Items are keyed by ordinal. Ordinals start at 1, grow by one per added item,
//! and are never reused or renumbered; editing an item (including marking it
//! complete) leaves its ordinal alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub ordinal: u32,
    pub text: String,
    pub completed: bool,
}

/// Counts reported alongside rendered plans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total_items: usize,
    pub completed_items: usize,
    pub pending_items: usize,
}

/// Requested changes to an existing item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub completed: Option<bool>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task #{0} not found")]
    UnknownOrdinal(u32),
    #[error("task text must not be empty")]
    EmptyText,
    #[error("nothing to edit: provide `completed` or `text`")]
    NothingToEdit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    items: BTreeMap<u32, TaskItem>,
    next_ordinal: u32,
}

impl Default for TaskList {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            next_ordinal: 1,
        }
    }
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and return it. Text is trimmed and must not be empty.
    pub fn add(&mut self, text: &str) -> Result<&TaskItem, TaskError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TaskError::EmptyText);
        }
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let item = self.items.entry(ordinal).or_insert(TaskItem {
            ordinal,
            text: text.to_string(),
            completed: false,
        });
        Ok(&*item)
    }

    /// Apply `edit` to item `ordinal`.
    ///
    /// The edit is validated in full before anything changes, so a failed edit
    /// leaves the item untouched.
    pub fn edit(&mut self, ordinal: u32, edit: TaskEdit) -> Result<&TaskItem, TaskError> {
        if edit.completed.is_none() && edit.text.is_none() {
            return Err(TaskError::NothingToEdit);
        }
        let text = match edit.text.as_deref().map(str::trim) {
            Some("") => return Err(TaskError::EmptyText),
            other => other.map(str::to_string),
        };
        let item = self
            .items
            .get_mut(&ordinal)
            .ok_or(TaskError::UnknownOrdinal(ordinal))?;
        if let Some(completed) = edit.completed {
            item.completed = completed;
        }
        if let Some(text) = text {
            item.text = text;
        }
        Ok(&*item)
    }

    pub fn get(&self, ordinal: u32) -> Option<&TaskItem> {
        self.items.get(&ordinal)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskItem> {
        self.items.values()
    }

    /// Owned copy for renderers and prompts.
    pub fn snapshot(&self) -> BTreeMap<u32, TaskItem> {
        self.items.clone()
    }

    pub fn stats(&self) -> TaskStats {
        let completed_items = self.items.values().filter(|item| item.completed).count();
        TaskStats {
            total_items: self.items.len(),
            completed_items,
            pending_items: self.items.len() - completed_items,
        }
    }

    /// Markdown checklist, one `- [ ] N. text` line per item.
    pub fn to_markdown(&self) -> String {
        if self.items.is_empty() {
            return "No todos yet.".to_string();
        }
        self.items
            .values()
            .map(|item| {
                let mark = if item.completed { "x" } else { " " };
                format!("- [{mark}] {}. {}", item.ordinal, item.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
