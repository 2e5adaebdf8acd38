//! Rule source preprocessing and the compiled-rule cache.
//!
//! A rule body is turned into a Lua chunk whose first line binds the fixed
//! parameter list from the chunk varargs:
//!
//! ```text
//! local req, res, boardId, name, ... = ...
//! <body>
//! ```
//!
//! Bodies starting with `<` are markup templates and become a single
//! string-returning expression. Single-line bodies get an implicit
//! `return` when that still compiles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mlua::Lua;

use super::SandboxError;

/// Ordered parameters of an action rule.
pub const ACTION_PARAMS: &[&str] = &[
    "req",
    "res",
    "boardId",
    "name",
    "states",
    "boardActions",
    "board",
    "userParams",
    "params",
    "token",
    "context",
    "http",
    "api",
    "logger",
    "stackTrace",
];

/// Ordered parameters of a value-card rule.
pub const VALUE_PARAMS: &[&str] = &["params", "states", "board", "card", "memory"];

/// Maximum number of prepared rules kept in a [`RuleCache`].
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Which parameter contract a rule is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Action,
    Value,
}

impl RuleKind {
    pub fn params(self) -> &'static [&'static str] {
        match self {
            RuleKind::Action => ACTION_PARAMS,
            RuleKind::Value => VALUE_PARAMS,
        }
    }
}

/// A syntax-checked chunk ready to be loaded into a fresh Lua state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRule {
    pub kind: RuleKind,
    pub chunk: String,
}

fn starts_with_return(body: &str) -> bool {
    body.strip_prefix("return")
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
}

/// Shortest long-bracket level whose closing sequence cannot occur in `text`.
fn bracket_level(text: &str) -> usize {
    (0..)
        .find(|level| !text.contains(&format!("]{}", "=".repeat(*level))))
        .unwrap_or(0)
}

/// Quote `text` as a Lua long-bracket string. The leading newline is
/// swallowed by the Lua lexer, so `text` is preserved exactly.
fn long_string(text: &str) -> String {
    let eq = "=".repeat(bracket_level(text));
    format!("[{eq}[\n{text}]{eq}]")
}

/// Split markup into literal and `${expr}` parts.
fn template_parts(markup: &str) -> Vec<(bool, &str)> {
    let mut parts = Vec::new();
    let mut rest = markup;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let mut depth = 0usize;
        let mut end = None;
        for (i, c) in after.char_indices() {
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    end = Some(i);
                    break;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        let Some(end) = end else { break };

        if start > 0 {
            parts.push((false, &rest[..start]));
        }
        parts.push((true, after[..end].trim()));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        parts.push((false, rest));
    }
    parts
}

/// Turn markup into a single `return` of the interpolated string.
pub fn markup_to_return(markup: &str) -> String {
    let pieces: Vec<String> = template_parts(markup)
        .into_iter()
        .filter(|(is_expr, text)| !(*is_expr && text.is_empty()))
        .map(|(is_expr, text)| {
            if is_expr {
                format!("tostring(({text}))")
            } else {
                long_string(text)
            }
        })
        .collect();

    if pieces.is_empty() {
        "return \"\"".to_string()
    } else {
        format!("return {}", pieces.join(" .. "))
    }
}

/// Candidate bodies for `body`, most specific first.
fn candidates(body: &str) -> Vec<String> {
    let trimmed = body.trim();
    if trimmed.starts_with('<') {
        return vec![markup_to_return(trimmed)];
    }
    if !trimmed.contains('\n') && !starts_with_return(trimmed) {
        return vec![format!("return {trimmed}"), trimmed.to_string()];
    }
    vec![body.to_string()]
}

fn with_prologue(kind: RuleKind, body: &str) -> String {
    format!("local {} = ...\n{body}", kind.params().join(", "))
}

/// Preprocess and syntax-check a rule body.
pub fn prepare(kind: RuleKind, body: &str) -> Result<PreparedRule, SandboxError> {
    let lua = Lua::new();
    let mut first_error = None;

    for candidate in candidates(body) {
        let chunk = with_prologue(kind, &candidate);
        match lua.load(chunk.as_str()).set_name("=rule").into_function() {
            Ok(_) => return Ok(PreparedRule { kind, chunk }),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(match first_error {
        Some(e) => SandboxError::from(e),
        None => SandboxError::Compile("empty rule".into()),
    })
}

/// Prepared rules keyed by `(kind, body)`.
///
/// Compilation failures are not cached. When full, the cache is cleared
/// wholesale; entries are cheap to rebuild.
pub struct RuleCache {
    entries: Mutex<HashMap<(RuleKind, String), Arc<PreparedRule>>>,
    capacity: usize,
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl RuleCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get_or_prepare(&self, kind: RuleKind, body: &str) -> Result<Arc<PreparedRule>, SandboxError> {
        let key = (kind, body.to_string());
        if let Some(hit) = self
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let prepared = Arc::new(prepare(kind, body)?);

        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(key, Arc::clone(&prepared));
        Ok(prepared)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
