//! Strict DDL script provider.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use super::SchemaProvider;
use crate::core::{RowSource, TargetLoader};
use crate::error::{MigrateError, Result};
use crate::spec::MigrationSpec;

/// A DDL script applied statement by statement; the first failure aborts.
#[derive(Debug, Clone)]
pub struct ScriptSchema {
    statements: Vec<String>,
    tables: Vec<String>,
}

impl ScriptSchema {
    /// Read and split a script file.
    pub fn load<P: AsRef<Path>>(path: P, tables: Vec<String>) -> Result<Self> {
        let script = std::fs::read_to_string(path)?;
        Ok(Self::from_script(&script, tables))
    }

    pub fn from_script(script: &str, tables: Vec<String>) -> Self {
        Self {
            statements: split_statements(script),
            tables,
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

#[async_trait]
impl SchemaProvider for ScriptSchema {
    fn name(&self) -> &str {
        "script"
    }

    fn canonical_tables(&self) -> Option<&[String]> {
        if self.tables.is_empty() {
            None
        } else {
            Some(&self.tables)
        }
    }

    async fn apply(
        &self,
        _source: &dyn RowSource,
        target: &dyn TargetLoader,
        _tables: &[String],
        _spec: &MigrationSpec,
    ) -> Result<()> {
        for (i, statement) in self.statements.iter().enumerate() {
            debug!("DDL {}/{}: {}", i + 1, self.statements.len(), first_line(statement));
            target.execute_ddl(statement).await.map_err(|e| match e {
                MigrateError::Schema(msg) => MigrateError::Schema(format!(
                    "statement {} ({}) failed: {}",
                    i + 1,
                    first_line(statement),
                    msg
                )),
                other => other,
            })?;
        }
        info!("Applied {} schema statements", self.statements.len());
        Ok(())
    }
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or_default().trim()
}

/// Split a script on `;`, ignoring semicolons inside quotes and comments.
///
/// Comment-only and empty statements are dropped. Dollar-quoted bodies are
/// not recognised.
pub fn split_statements(script: &str) -> Vec<String> {
    #[derive(PartialEq)]
    enum State {
        Code,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut state = State::Code;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                ';' => {
                    if has_code {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                    continue;
                }
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    has_code = true;
                }
                '-' if chars.peek() == Some(&'-') => state = State::LineComment,
                '/' if chars.peek() == Some(&'*') => state = State::BlockComment,
                c if !c.is_whitespace() => has_code = true,
                _ => {}
            },
            State::Quoted(q) if c == q => state = State::Code,
            State::Quoted(_) => {}
            State::LineComment if c == '\n' => state = State::Code,
            State::LineComment => {}
            State::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                current.push(c);
                if let Some(slash) = chars.next() {
                    current.push(slash);
                }
                state = State::Code;
                continue;
            }
            State::BlockComment => {}
        }
        current.push(c);
    }

    if has_code {
        statements.push(current.trim().to_string());
    }
    statements
}
