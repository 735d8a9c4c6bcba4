///
/// This module implements the CLI interface for ach: command parsing, the
/// confirmation prompt for destructive commands, and the glue that builds a
/// session and hands it to the core operations.
///
/// All business logic (session bootstrap, export/import, scripts) lives in the
/// [`ach-core`] crate; this module only wires arguments to it.
///
/// ## How To Use
/// - From a shell: `ach --help`.
/// - Programmatically or in tests: call [`run`] with a constructed [`Cli`], or
///   [`run_with`] to inject a connector and consent opener.
///
/// [`ach-core`]: ../../ach-core/
use crate::client::CozyConnector;
use crate::load_config::{load_config, session_options, Overrides};
use ach_core::authorize::{ConsentOpener, SystemBrowser};
use ach_core::config::{SessionOptions, StripOptions};
use ach_core::contract::Connector;
use ach_core::export::{export_to, ExportSink};
use ach_core::import::{delete_documents, drop_doctypes, import_artifact, load_artifact};
use ach_core::script::{RunMode, ScriptRegistry};
use ach_core::create_session;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// CLI for ach: import, export, drop and migrate doctypes of a Cozy instance.
#[derive(Parser, Debug)]
#[clap(
    name = "ach",
    version,
    about = "Import, export, drop and migrate documents of a Cozy instance"
)]
pub struct Cli {
    /// Token file to use; created by the authorization flow when missing
    #[clap(short = 't', long, global = true)]
    pub token: Option<PathBuf>,

    /// URL of the instance [default: http://cozy.tools:8080]
    #[clap(short = 'u', long, global = true)]
    pub url: Option<String>,

    /// Do not ask for confirmation on destructive operations
    #[clap(short = 'y', long, global = true)]
    pub yes: bool,

    /// Optional YAML settings file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Local port receiving the authorization redirect [default: 3333]
    #[clap(long, global = true)]
    pub callback_port: Option<u16>,

    /// Give up waiting for consent after this many seconds
    #[clap(long, global = true)]
    pub consent_timeout: Option<u64>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export all documents of the doctypes (separated by commas) to a file, or "-" for stdout
    Export { doctypes: String, filename: String },
    /// Import documents from a file produced by export
    Import { filepath: PathBuf },
    /// Delete all documents of the provided doctypes. For real.
    Drop {
        #[clap(required = true)]
        doctypes: Vec<String>,
    },
    /// Delete document(s) by id
    Delete {
        doctype: String,
        #[clap(required = true)]
        ids: Vec<String>,
    },
    /// Launch a migration script (dry run unless --execute)
    Script {
        name: String,
        /// Execute the script (disable dry run)
        #[clap(short = 'x', long)]
        execute: bool,
        /// Print the doctypes the script needs and exit
        #[clap(short = 'd', long)]
        doctypes: bool,
        /// Arguments passed to the script, after `--`
        #[clap(last = true)]
        args: Vec<String>,
    },
    /// List all scripts, one per line
    LsScripts {
        /// Print each script's description after a tab
        #[clap(short = 'l', long = "long")]
        long: bool,
    },
}

impl Cli {
    fn session_options(&self) -> Result<SessionOptions> {
        let file = match &self.config {
            Some(path) => Some(load_config(path)?),
            None => None,
        };
        Ok(session_options(
            file,
            Overrides {
                url: self.url.clone(),
                token: self.token.clone(),
                callback_port: self.callback_port,
                consent_timeout_secs: self.consent_timeout,
            },
        ))
    }
}

fn split_doctypes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

fn confirm_drop(doctypes: &[String]) -> Result<bool> {
    let listing = doctypes
        .iter()
        .map(|d| format!("* {d}"))
        .collect::<Vec<_>>()
        .join("\n");
    eprint!("These doctypes will be removed.\n\n{listing}\n\nType \"yes\" if ok.\n");
    std::io::stderr().flush().ok();
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(answer.trim() == "yes")
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    run_with(cli, &CozyConnector::new(), &SystemBrowser).await
}

pub async fn run_with<C>(cli: Cli, connector: &C, opener: &dyn ConsentOpener) -> Result<()>
where
    C: Connector + ?Sized,
{
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match &cli.command {
        Commands::LsScripts { long } => {
            let registry = ScriptRegistry::builtin();
            let lines: Vec<String> = if *long {
                registry
                    .describe()
                    .into_iter()
                    .map(|(name, description)| format!("{name}\t{description}"))
                    .collect()
            } else {
                registry.names().into_iter().map(str::to_string).collect()
            };
            println!("{}", lines.join("\n"));
            Ok(())
        }
        Commands::Script {
            name,
            execute,
            doctypes,
            args,
        } => {
            let registry = ScriptRegistry::builtin();
            let script = registry.load(name)?.resolve();
            if *doctypes {
                println!("{}", script.doctypes().join(" "));
                return Ok(());
            }
            let mode = RunMode::from_execute_flag(*execute);
            tracing::info!(
                command = "script",
                script = %name,
                dry_run = mode.is_dry_run(),
                "Launching script"
            );

            let options = cli.session_options()?;
            let session = create_session(connector, opener, &options, script.doctypes()).await?;
            let platform = connector.connect(&session);
            let mut stdout = std::io::stdout();
            script
                .execute(&session, platform.as_ref(), mode, args, &mut stdout)
                .await?;
            Ok(())
        }
        Commands::Export { doctypes, filename } => {
            let doctypes = split_doctypes(doctypes);
            anyhow::ensure!(!doctypes.is_empty(), "No doctype given to export");
            let options = cli.session_options()?;
            let session = create_session(connector, opener, &options, &doctypes).await?;
            let platform = connector.connect(&session);
            let strip = StripOptions::from_env();
            let artifact =
                export_to(platform.as_ref(), &doctypes, &strip, &ExportSink::parse(filename))
                    .await?;
            tracing::info!(command = "export", doctypes = artifact.len(), "Export complete");
            Ok(())
        }
        Commands::Import { filepath } => {
            let artifact = load_artifact(filepath)?;
            let doctypes: Vec<String> = artifact.doctypes().map(str::to_string).collect();
            let options = cli.session_options()?;
            let session = create_session(connector, opener, &options, &doctypes).await?;
            let platform = connector.connect(&session);
            let report = import_artifact(platform.as_ref(), &artifact).await?;
            for entry in &report.doctypes {
                println!("Imported {} document(s) into {}", entry.count, entry.doctype);
            }
            Ok(())
        }
        Commands::Drop { doctypes } => {
            if !cli.yes && !confirm_drop(doctypes)? {
                println!("Cancelled drop");
                return Ok(());
            }
            let options = cli.session_options()?;
            let session = create_session(connector, opener, &options, doctypes).await?;
            let platform = connector.connect(&session);
            let report = drop_doctypes(platform.as_ref(), doctypes).await?;
            for entry in &report.doctypes {
                println!("Dropped {} document(s) of {}", entry.count, entry.doctype);
            }
            Ok(())
        }
        Commands::Delete { doctype, ids } => {
            let options = cli.session_options()?;
            let session =
                create_session(connector, opener, &options, std::slice::from_ref(doctype)).await?;
            let platform = connector.connect(&session);
            let report = delete_documents(platform.as_ref(), doctype, ids).await?;
            println!("Deleted {} document(s) of {}", report.total(), doctype);
            Ok(())
        }
    }
}
