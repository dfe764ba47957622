//! Filesystem tools: `tree`, `read_file`, `write_file`.
//!
//! Each tool asks the guard first and only then touches the disk. The
//! blacklist is applied after the guard, to paths the guard already admitted.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::path::display_relative;
use crate::core::sandbox::WriteKind;
use crate::io::writer::{FileOperation, FileWriter};
use crate::tools::registry::ToolDescriptor;
use crate::tools::{ToolContext, ToolFailure, ToolName, ToolResult, parse_args};

const BINARY_SNIFF_BYTES: usize = 1024;
const VISIBLE_DOTFILES: &[&str] = &[".gitignore", ".env.example", ".github"];
const SOURCE_EXTENSIONS: &[&str] = &["py", "js", "ts", "go", "rs"];

pub fn tree() -> ToolDescriptor {
    ToolDescriptor {
        name: ToolName::Tree,
        description: "Show the directory tree under a path, to a limited depth. \
                      Use it to explore the project layout.",
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the project root",
                    "default": "."
                },
                "depth": {
                    "type": "integer",
                    "description": "Maximum depth to show (1-10)",
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "additionalProperties": false
        }),
        invoke: run_tree,
    }
}

pub fn read_file() -> ToolDescriptor {
    ToolDescriptor {
        name: ToolName::ReadFile,
        description: "Read a text file inside the project. Sensitive, binary and very \
                      large files are rejected.",
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File to read, relative to the project root",
                    "minLength": 1
                }
            },
            "required": ["path"],
            "additionalProperties": false
        }),
        invoke: run_read_file,
    }
}

pub fn write_file() -> ToolDescriptor {
    ToolDescriptor {
        name: ToolName::WriteFile,
        description: "Create, update or delete a file inside the project. Only available \
                      when the operator has allowed writes.",
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File to change, relative to the project root",
                    "minLength": 1
                },
                "action": {
                    "type": "string",
                    "enum": ["create", "update", "delete"]
                },
                "content": {
                    "type": "string",
                    "description": "Full new file content (ignored for delete)"
                }
            },
            "required": ["path", "action"],
            "additionalProperties": false
        }),
        invoke: run_write_file,
    }
}

#[derive(Debug, Deserialize)]
struct TreeArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    depth: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    action: WriteKind,
    #[serde(default)]
    content: String,
}

fn run_tree(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    tree_inner(args, ctx).into()
}

fn run_read_file(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    read_file_inner(args, ctx).into()
}

fn run_write_file(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    write_file_inner(args, ctx).into()
}

fn tree_inner(args: &Value, ctx: &ToolContext<'_>) -> Result<Value, ToolFailure> {
    let args: TreeArgs = parse_args(ToolName::Tree, args)?;
    let requested = args.path.unwrap_or_else(|| ".".to_string());
    let depth = args.depth.unwrap_or(ctx.env.limits.default_tree_depth);

    let guard = &ctx.env.guard;
    let target = guard.admit_read(Path::new(&requested))?;
    let relative = display_relative(guard.root(), &target);
    if target != guard.root() && ctx.env.blacklist.is_blocked(Path::new(&relative)) {
        return Err(ToolFailure::Blacklisted { path: relative });
    }
    if !target.exists() {
        return Err(ToolFailure::NotFound { path: relative });
    }
    if !target.is_dir() {
        return Err(ToolFailure::NotADirectory { path: relative });
    }

    let mut walk = TreeWalk {
        ctx,
        max_depth: depth,
        budget: ctx.env.limits.max_tree_entries,
        lines: Vec::new(),
        truncated: false,
    };
    walk.visit(&target, 0, "")?;
    if walk.truncated {
        walk.lines.push(format!(
            "... (truncated after {} entries)",
            ctx.env.limits.max_tree_entries
        ));
    }
    debug!(path = %relative, entries = walk.lines.len(), "built tree");

    Ok(json!({
        "tree": walk.lines.join("\n"),
        "path": requested,
        "depth": depth,
        "root": relative,
    }))
}

struct TreeWalk<'c, 'a> {
    ctx: &'c ToolContext<'a>,
    max_depth: u32,
    budget: usize,
    lines: Vec<String>,
    truncated: bool,
}

impl TreeWalk<'_, '_> {
    fn visit(&mut self, dir: &Path, level: u32, prefix: &str) -> Result<(), ToolFailure> {
        if level >= self.max_depth || self.truncated {
            return Ok(());
        }
        let ctx = self.ctx;
        let guard = &ctx.env.guard;
        let read = fs::read_dir(dir).map_err(|err| ToolFailure::Io {
            path: display_relative(guard.root(), dir),
            message: err.to_string(),
        })?;

        let mut entries = Vec::new();
        for entry in read {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') && !VISIBLE_DOTFILES.contains(&name.as_str()) {
                continue;
            }
            // Symlinks that leave the root are dropped from the listing.
            let Ok(resolved) = guard.admit_read(&entry.path()) else {
                continue;
            };
            let relative = display_relative(guard.root(), &entry.path());
            if ctx.env.blacklist.is_blocked(Path::new(&relative)) {
                continue;
            }
            entries.push((name, resolved));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let count = entries.len();
        for (index, (name, resolved)) in entries.into_iter().enumerate() {
            if self.budget == 0 {
                self.truncated = true;
                return Ok(());
            }
            self.budget -= 1;

            let last = index + 1 == count;
            let connector = if last { "└── " } else { "├── " };
            let is_dir = resolved.is_dir();
            let suffix = if is_dir {
                "/"
            } else if Path::new(&name)
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
            {
                "*"
            } else {
                ""
            };
            self.lines.push(format!("{prefix}{connector}{name}{suffix}"));

            if is_dir {
                let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
                self.visit(&resolved, level + 1, &child_prefix)?;
            }
        }
        Ok(())
    }
}

fn read_file_inner(args: &Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolFailure> {
    let args: ReadFileArgs = parse_args(ToolName::ReadFile, args)?;
    let guard = &ctx.env.guard;
    let target = guard.admit_read(Path::new(&args.path))?;
    let relative = display_relative(guard.root(), &target);

    if !target.exists() {
        return Err(ToolFailure::NotFound { path: relative });
    }
    if !target.is_file() {
        return Err(ToolFailure::NotAFile { path: relative });
    }
    if ctx.env.blacklist.is_blocked(Path::new(&relative)) {
        return Err(ToolFailure::Blacklisted { path: relative });
    }

    let io_err = |err: std::io::Error| ToolFailure::Io {
        path: relative.clone(),
        message: err.to_string(),
    };
    let size = fs::metadata(&target).map_err(io_err)?.len();
    let limit = ctx.env.limits.max_file_bytes;
    if size > limit {
        return Err(ToolFailure::TooLarge {
            path: relative,
            size,
            limit,
        });
    }
    let bytes = fs::read(&target).map_err(io_err)?;
    if bytes.iter().take(BINARY_SNIFF_BYTES).any(|byte| *byte == 0) {
        return Err(ToolFailure::Binary { path: relative });
    }
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        // Latin-1 maps every byte to the code point of the same value.
        Err(err) => err.into_bytes().iter().map(|&byte| char::from(byte)).collect(),
    };

    ctx.files_read.insert(target);
    Ok(json!({
        "path": relative,
        "size_bytes": size,
        "lines": content.lines().count(),
        "content": content,
    }))
}

fn write_file_inner(args: &Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolFailure> {
    let args: WriteFileArgs = parse_args(ToolName::WriteFile, args)?;
    let env = ctx.env;
    let mut writer = FileWriter::new(&env.guard, &env.blacklist);
    writer.stage(FileOperation {
        path: args.path.into(),
        kind: args.action,
        content: args.content,
    })?;
    debug!(preview = %writer.preview(), "staged write");

    let changes = writer.apply(env.limits.dry_run_writes)?;
    let change = changes
        .into_iter()
        .next()
        .ok_or_else(|| ToolFailure::Io {
            path: String::new(),
            message: "no change was applied".to_string(),
        })?;
    Ok(json!({
        "path": change.path,
        "action": change.kind,
        "change": change.outcome,
        "dry_run": env.limits.dry_run_writes,
    }))
}
