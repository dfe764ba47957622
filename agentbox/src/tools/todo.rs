//! Task-list tools: `todo_view`, `todo_add`, `todo_edit`.
//!
//! These mutate the run's [`TaskList`](crate::core::tasks::TaskList) directly and never reach the
//! guard; they touch no files.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::tasks::TaskEdit;
use crate::tools::registry::ToolDescriptor;
use crate::tools::{ToolContext, ToolFailure, ToolName, ToolResult, parse_args};

pub fn view() -> ToolDescriptor {
    ToolDescriptor {
        name: ToolName::TodoView,
        description: "Show the current todo list as markdown, with completion counts.",
        parameters: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
        invoke: run_view,
    }
}

pub fn add() -> ToolDescriptor {
    ToolDescriptor {
        name: ToolName::TodoAdd,
        description: "Append an item to the todo list. Items are numbered in the order they \
                      are added and keep their number forever.",
        parameters: json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "What needs to be done",
                    "minLength": 1
                }
            },
            "required": ["text"],
            "additionalProperties": false
        }),
        invoke: run_add,
    }
}

pub fn edit() -> ToolDescriptor {
    ToolDescriptor {
        name: ToolName::TodoEdit,
        description: "Mark a todo item complete or incomplete, or reword it. \
                      Provide at least one of `completed` and `text`.",
        parameters: json!({
            "type": "object",
            "properties": {
                "number": {
                    "type": "integer",
                    "description": "Number of the item to edit",
                    "minimum": 1
                },
                "completed": { "type": "boolean" },
                "text": { "type": "string" }
            },
            "required": ["number"],
            "additionalProperties": false
        }),
        invoke: run_edit,
    }
}

#[derive(Debug, Deserialize)]
struct AddArgs {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EditArgs {
    number: u32,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    text: Option<String>,
}

fn run_view(_args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    let stats = ctx.tasks.stats();
    ToolResult::ok(json!({
        "markdown": ctx.tasks.to_markdown(),
        "total_items": stats.total_items,
        "completed_items": stats.completed_items,
        "pending_items": stats.pending_items,
    }))
}

fn run_add(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    add_inner(args, ctx).into()
}

fn run_edit(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    edit_inner(args, ctx).into()
}

fn add_inner(args: &Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolFailure> {
    let args: AddArgs = parse_args(ToolName::TodoAdd, args)?;
    let item = ctx.tasks.add(&args.text)?.clone();
    Ok(json!({
        "number": item.ordinal,
        "text": item.text,
        "added": true,
        "new_markdown": ctx.tasks.to_markdown(),
    }))
}

fn edit_inner(args: &Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolFailure> {
    let args: EditArgs = parse_args(ToolName::TodoEdit, args)?;
    let item = ctx
        .tasks
        .edit(
            args.number,
            TaskEdit {
                completed: args.completed,
                text: args.text,
            },
        )?
        .clone();
    Ok(json!({
        "number": item.ordinal,
        "updated": true,
        "item": {
            "number": item.ordinal,
            "text": item.text,
            "completed": item.completed,
        },
        "new_markdown": ctx.tasks.to_markdown(),
    }))
}
