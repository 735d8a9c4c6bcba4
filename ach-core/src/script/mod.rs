//! # script: migration scripts and the harness that runs them
//!
//! A script is a [`MigrationScript`] registered in a [`ScriptRegistry`]. One
//! invocation goes through
//! `Loaded → DoctypesResolved → (DryRunPreview | Applied) → Done`:
//!
//! 1. [`ScriptRegistry::load`] finds the script by name or fails with
//!    [`AchError::ScriptNotFound`].
//! 2. [`LoadedScript::resolve`] asks for the doctypes it touches. This happens
//!    before a session is created since scopes are fixed at registration.
//! 3. [`ResolvedScript::execute`] runs it with the session and prints the report.
//!
//! In dry-run mode a script must compute its changes without mutating. The
//! harness does not check this; scripts are reviewed for it.

mod bank_transactions_check_tin_date;

use std::fmt;
use std::io::Write;

use async_trait::async_trait;
use tracing::{error, info};

use crate::contract::{Platform, PlatformError};
use crate::diff::DocumentDiff;
use crate::error::AchError;
use crate::session::Session;

pub use bank_transactions_check_tin_date::BankTransactionsCheckTinDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    /// Without an explicit execute flag, scripts run dry.
    pub fn from_execute_flag(execute: bool) -> Self {
        if execute {
            RunMode::Apply
        } else {
            RunMode::DryRun
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == RunMode::DryRun
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::DryRun => f.write_str("dry run"),
            RunMode::Apply => f.write_str("apply"),
        }
    }
}

/// What a script receives for one run.
pub struct ScriptRun<'a> {
    pub session: &'a Session,
    pub platform: &'a dyn Platform,
    pub dry_run: bool,
    pub args: &'a [String],
}

/// What a script reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptReport {
    /// Before/after previews of documents the script changes (or would change).
    pub diffs: Vec<DocumentDiff>,
    /// Free-form summary lines.
    pub lines: Vec<String>,
}

impl ScriptReport {
    pub fn render(&self, mode: RunMode) -> String {
        let mut out = String::new();
        if mode.is_dry_run() {
            let changed: Vec<&DocumentDiff> = self.diffs.iter().filter(|d| !d.is_empty()).collect();
            if changed.is_empty() {
                out.push_str("Dry run: No changes\n");
            } else {
                out.push_str(&format!("Dry run: {} document(s) previewed\n", changed.len()));
                for diff in changed {
                    out.push('\n');
                    out.push_str(&diff.to_string());
                }
                out.push('\n');
            }
        }
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

#[async_trait]
pub trait MigrationScript: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Doctypes the script reads or writes. Must not depend on the platform.
    fn doctypes(&self) -> Vec<String>;

    async fn run(&self, run: ScriptRun<'_>) -> Result<ScriptReport, PlatformError>;
}

pub struct ScriptRegistry {
    location: String,
    scripts: Vec<Box<dyn MigrationScript>>,
}

impl ScriptRegistry {
    pub fn new(location: impl Into<String>) -> Self {
        ScriptRegistry {
            location: location.into(),
            scripts: Vec::new(),
        }
    }

    /// Scripts shipped with the tool.
    pub fn builtin() -> Self {
        let mut registry = ScriptRegistry::new(concat!(module_path!(), " (built-in scripts)"));
        registry.register(Box::new(BankTransactionsCheckTinDate));
        registry
    }

    /// A later registration under an existing name replaces the earlier one.
    pub fn register(&mut self, script: Box<dyn MigrationScript>) {
        self.scripts.retain(|s| s.name() != script.name());
        self.scripts.push(script);
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.scripts.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        let mut entries: Vec<_> = self
            .scripts
            .iter()
            .map(|s| (s.name(), s.description()))
            .collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries
    }

    pub fn load(&self, name: &str) -> Result<LoadedScript<'_>, AchError> {
        match self.scripts.iter().find(|s| s.name() == name) {
            Some(script) => {
                info!(script = name, "Loaded script");
                Ok(LoadedScript {
                    script: script.as_ref(),
                })
            }
            None => {
                error!(script = name, location = %self.location, "Script does not exist");
                Err(AchError::ScriptNotFound {
                    name: name.to_string(),
                    location: self.location.clone(),
                })
            }
        }
    }
}

pub struct LoadedScript<'r> {
    script: &'r dyn MigrationScript,
}

impl<'r> LoadedScript<'r> {
    pub fn name(&self) -> &'static str {
        self.script.name()
    }

    pub fn resolve(self) -> ResolvedScript<'r> {
        let doctypes = self.script.doctypes();
        info!(script = self.script.name(), doctypes = ?doctypes, "Resolved script doctypes");
        ResolvedScript {
            script: self.script,
            doctypes,
        }
    }
}

pub struct ResolvedScript<'r> {
    script: &'r dyn MigrationScript,
    doctypes: Vec<String>,
}

impl<'r> ResolvedScript<'r> {
    pub fn name(&self) -> &'static str {
        self.script.name()
    }

    pub fn doctypes(&self) -> &[String] {
        &self.doctypes
    }

    /// Runs the script and writes its rendered report to `out`.
    pub async fn execute(
        self,
        session: &Session,
        platform: &dyn Platform,
        mode: RunMode,
        args: &[String],
        out: &mut (dyn Write + Send),
    ) -> Result<ScriptReport, AchError> {
        let name = self.script.name();
        info!(script = name, %mode, "Launching script");

        let report = self
            .script
            .run(ScriptRun {
                session,
                platform,
                dry_run: mode.is_dry_run(),
                args,
            })
            .await
            .map_err(|source| {
                error!(script = name, error = %source, "Script failed");
                AchError::ScriptFailed {
                    name: name.to_string(),
                    source,
                }
            })?;

        out.write_all(report.render(mode).as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| AchError::io("<script output>", e))?;

        info!(script = name, %mode, "Script done");
        Ok(report)
    }
}
