//! Static read-only validation for generated SQL.
//!
//! Checks, in order:
//! 1. Comments are removed (nested `/* */` and `--`), each replaced by
//!    whitespace so they cannot glue or split tokens
//! 2. Denylisted verbs are rejected as whole-word tokens, case-insensitively
//! 3. Only one statement (a single trailing `;` is allowed)
//! 4. The statement must begin with `SELECT` or `WITH`
//!
//! `E'...'` literals always treat `\` as an escape. With
//! `backslash_escapes` on, plain literals may too, so a statement must pass
//! under both readings.
//!
//! Accepted statements get a `LIMIT` appended when they lack one.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Trailing `LIMIT n`, `LIMIT ALL`, `LIMIT n OFFSET m` or
/// `FETCH FIRST|NEXT [n] ROW[S] ONLY` at top level.
static TRAILING_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\blimit\s+(\d+|all)(\s+offset\s+\d+)?|\bfetch\s+(first|next)(\s+\d+)?\s+rows?\s+only)\s*$",
    )
    .expect("valid regex")
});

/// Leading statement keyword, after any opening parentheses.
static LEADING_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s(]*([A-Za-z_]+)").expect("valid regex"));

/// Outcome of validating one candidate statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    /// The statement that will execute (comments removed, limit applied).
    Accept { sql: String },
    Reject { reason: String },
}

impl ValidationVerdict {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    pub fn accepted_sql(&self) -> Option<&str> {
        match self {
            Self::Accept { sql } => Some(sql),
            Self::Reject { .. } => None,
        }
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::Accept { .. } => None,
            Self::Reject { reason } => Some(reason),
        }
    }
}

/// Validator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Lowercase verbs rejected wherever they appear as a token.
    pub denylist: Vec<String>,
    /// Appended as `LIMIT n` when absent. `None` disables.
    pub row_limit: Option<u32>,
    /// Plain `'...'` literals may use `\` escapes (Redshift, legacy Postgres).
    pub backslash_escapes: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            denylist: defaults::DENYLIST.iter().map(|s| s.to_string()).collect(),
            row_limit: Some(defaults::ROW_LIMIT),
            backslash_escapes: true,
        }
    }
}

impl ValidatorConfig {
    /// Load from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ASKDATA_ROW_LIMIT` | 1000 | Appended row limit, `0` disables |
    /// | `ASKDATA_DENYLIST` | built-in | Comma-separated verbs |
    /// | `ASKDATA_BACKSLASH_ESCAPES` | true | `\` escapes in plain literals |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(limit) = std::env::var("ASKDATA_ROW_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.row_limit = if limit == 0 { None } else { Some(limit) };
        }

        if let Ok(v) = std::env::var("ASKDATA_BACKSLASH_ESCAPES") {
            config.backslash_escapes = v != "false" && v != "0";
        }

        if let Ok(list) = std::env::var("ASKDATA_DENYLIST") {
            let verbs: Vec<String> = list
                .split(',')
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect();
            if !verbs.is_empty() {
                config.denylist = verbs;
            }
        }

        config
    }

    pub fn with_row_limit(mut self, limit: Option<u32>) -> Self {
        self.row_limit = limit.filter(|n| *n > 0);
        self
    }

    pub fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    pub fn with_denylist<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denylist = verbs.into_iter().map(|v| v.into().to_lowercase()).collect();
        self
    }
}

/// Static inspector enforcing the read-only allow-list.
#[derive(Debug, Clone)]
pub struct SafetyValidator {
    denylist: HashSet<String>,
    row_limit: Option<u32>,
    backslash_escapes: bool,
}

impl Default for SafetyValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl SafetyValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            denylist: config
                .denylist
                .into_iter()
                .map(|v| v.to_lowercase())
                .collect(),
            row_limit: config.row_limit.filter(|n| *n > 0),
            backslash_escapes: config.backslash_escapes,
        }
    }

    /// Validate one candidate statement.
    pub fn check(&self, sql: &str) -> ValidationVerdict {
        let lexed = lex(sql, self.backslash_escapes);
        if let Err(verdict) = self.inspect(&lexed) {
            return verdict;
        }
        if self.backslash_escapes {
            if let Err(verdict) = self.inspect(&lex(sql, false)) {
                return verdict;
            }
        }

        let end = statement_end(&lexed.shape);
        let mut statement = lexed.text[..end].trim().to_string();
        if let Some(limit) = self.row_limit {
            if !TRAILING_LIMIT.is_match(lexed.shape[..end].trim_end()) {
                statement = format!("{} LIMIT {}", statement, limit);
            }
        }

        ValidationVerdict::Accept { sql: statement }
    }

    fn inspect(&self, lexed: &Lexed) -> Result<(), ValidationVerdict> {
        if lexed.shape.trim().is_empty() {
            return Err(ValidationVerdict::reject("empty statement"));
        }

        // Literal contents are scanned too: a verb anywhere in the text rejects.
        if let Some(verb) = self.first_denied_token(&lexed.text) {
            return Err(ValidationVerdict::reject(format!(
                "disallowed operation: {}",
                verb
            )));
        }

        let end = statement_end(&lexed.shape);
        if lexed.shape[..end].contains(';') {
            return Err(ValidationVerdict::reject(
                "multiple statements are not allowed",
            ));
        }

        let leading = LEADING_KEYWORD
            .captures(&lexed.shape[..end])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase());
        if !matches!(leading.as_deref(), Some("select") | Some("with")) {
            return Err(ValidationVerdict::reject(
                "only read-only SELECT statements are allowed",
            ));
        }
        Ok(())
    }

    fn first_denied_token(&self, text: &str) -> Option<String> {
        text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_ascii_lowercase())
            .find(|t| self.denylist.contains(t))
    }
}

/// Byte offset where the statement ends: trailing whitespace and one
/// trailing `;` are excluded.
fn statement_end(shape: &str) -> usize {
    let trimmed = shape.trim_end();
    match trimmed.strip_suffix(';') {
        Some(rest) => rest.len(),
        None => trimmed.len(),
    }
}

/// Two byte-aligned views of a statement.
struct Lexed {
    /// Comments blanked, literals intact.
    text: String,
    /// Comments and literal contents blanked; used for structure checks.
    shape: String,
}

#[derive(Clone, Copy)]
enum LexState {
    Code,
    SingleQuoted { backslash: bool },
    DoubleQuoted,
    LineComment,
    BlockComment(usize),
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    }
}

/// True when the `'` about to open follows a lone `E` prefix.
fn escape_prefixed(shape: &str) -> bool {
    let mut rev = shape.chars().rev();
    matches!(rev.next(), Some('E') | Some('e'))
        && !rev
            .next()
            .is_some_and(|p| p.is_ascii_alphanumeric() || p == '_')
}

fn lex(sql: &str, backslash_escapes: bool) -> Lexed {
    let mut text = String::with_capacity(sql.len());
    let mut shape = String::with_capacity(sql.len());
    let mut state = LexState::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            LexState::Code => match c {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    blank(&mut text, ' ');
                    blank(&mut text, ' ');
                    blank(&mut shape, ' ');
                    blank(&mut shape, ' ');
                    state = LexState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    text.push_str("  ");
                    shape.push_str("  ");
                    state = LexState::BlockComment(1);
                }
                '\'' => {
                    let backslash = backslash_escapes || escape_prefixed(&shape);
                    text.push(c);
                    shape.push(c);
                    state = LexState::SingleQuoted { backslash };
                }
                '"' => {
                    text.push(c);
                    shape.push(c);
                    state = LexState::DoubleQuoted;
                }
                _ => {
                    text.push(c);
                    shape.push(c);
                }
            },
            LexState::SingleQuoted { backslash: true } if c == '\\' => {
                text.push(c);
                blank(&mut shape, c);
                if let Some(next) = chars.next() {
                    text.push(next);
                    blank(&mut shape, next);
                }
            }
            LexState::SingleQuoted { .. } | LexState::DoubleQuoted => {
                let quote = if matches!(state, LexState::DoubleQuoted) {
                    '"'
                } else {
                    '\''
                };
                text.push(c);
                if c == quote {
                    if chars.peek() == Some(&quote) {
                        // Doubled quote is an escaped quote inside the literal.
                        if let Some(next) = chars.next() {
                            text.push(next);
                        }
                        shape.push_str("  ");
                    } else {
                        shape.push(c);
                        state = LexState::Code;
                    }
                } else {
                    blank(&mut shape, c);
                }
            }
            LexState::LineComment => {
                blank(&mut text, c);
                blank(&mut shape, c);
                if c == '\n' {
                    state = LexState::Code;
                }
            }
            LexState::BlockComment(depth) => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    text.push_str("  ");
                    shape.push_str("  ");
                    state = if depth == 1 {
                        LexState::Code
                    } else {
                        LexState::BlockComment(depth - 1)
                    };
                } else if c == '/' && chars.peek() == Some(&'*') {
                    chars.next();
                    text.push_str("  ");
                    shape.push_str("  ");
                    state = LexState::BlockComment(depth + 1);
                } else {
                    blank(&mut text, c);
                    blank(&mut shape, c);
                }
            }
        }
    }

    Lexed { text, shape }
}
