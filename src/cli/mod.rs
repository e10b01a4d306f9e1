//! Command-line interface for teamflow.
//!
//! Provides commands for starting runs, following their progress,
//! cancelling, regenerating steps, and exporting finished documents.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{ExportFormat, HttpRunApi, RunApi};
use crate::config::{self, ResolvedConfig};
use crate::core::{IdeaBuffer, RunSession, SessionUpdate};
use crate::domain::{RunId, StepName};
use crate::export::DirectoryDownloadSink;
use crate::store::{FileIdeaStore, IdeaStore};

pub mod render;

/// teamflow - plan a product with a team of agents
#[derive(Parser, Debug)]
#[command(name = "teamflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a run and follow it until it finishes
    Run {
        /// Product idea (falls back to the last submitted idea)
        idea: Option<String>,

        /// Read the idea from a file
        #[arg(short, long, conflicts_with = "idea")]
        input: Option<PathBuf>,

        /// Print the run ID and exit without following
        #[arg(long)]
        detach: bool,
    },

    /// Follow an existing run
    Watch {
        /// Run ID
        run_id: String,

        /// Only show events for this step (pm, tech, qa, principal, review)
        #[arg(short, long)]
        step: Option<StepName>,
    },

    /// Show the status of a run
    Status {
        /// Run ID
        run_id: String,
    },

    /// Cancel a queued or running run
    Cancel {
        /// Run ID
        run_id: String,
    },

    /// Rerun one step of a run
    Regenerate {
        /// Run ID
        run_id: String,

        /// Step to rerun
        step: StepName,

        /// Follow the run after the step is requeued
        #[arg(short, long)]
        watch: bool,
    },

    /// Fetch the exported document of a completed run
    Export {
        /// Run ID
        run_id: String,

        /// Export format
        #[arg(short, long, value_enum, default_value = "md")]
        format: FormatArg,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Save a completed run as a notebook
    Notebook {
        /// Run ID
        run_id: String,

        /// Directory to write to (defaults to the configured downloads directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show the last submitted idea
    Idea,

    /// Show resolved configuration
    Config,
}

/// Export format for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Md,
    Ide,
    Cursor,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Md => ExportFormat::Markdown,
            FormatArg::Ide => ExportFormat::Ide,
            FormatArg::Cursor => ExportFormat::Cursor,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                idea,
                input,
                detach,
            } => start_run(idea, input, detach).await,
            Commands::Watch { run_id, step } => watch_run(&run_id, step).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Cancel { run_id } => cancel_run(&run_id).await,
            Commands::Regenerate {
                run_id,
                step,
                watch,
            } => regenerate_step(&run_id, step, watch).await,
            Commands::Export {
                run_id,
                format,
                output,
            } => export_run(&run_id, format.into(), output).await,
            Commands::Notebook { run_id, dir } => save_notebook(&run_id, dir).await,
            Commands::Idea => show_idea().await,
            Commands::Config => show_config().await,
        }
    }
}

/// Build a session against the configured service
fn open_session(cfg: &ResolvedConfig, downloads: PathBuf) -> (Arc<HttpRunApi>, RunSession) {
    let api = Arc::new(HttpRunApi::new(cfg.api_base_url.clone()));
    let session = RunSession::new(api.clone(), cfg.session)
        .with_idea_store(Arc::new(FileIdeaStore::in_home(&cfg.home)))
        .with_download_sink(Arc::new(DirectoryDownloadSink::new(downloads)));
    (api, session)
}

/// Attach to a run, turning a failure into a CLI error
async fn attach(session: &mut RunSession, run_id: &str) -> Result<()> {
    let run_id = RunId::new(run_id.trim());
    session
        .attach(run_id.clone())
        .await
        .with_context(|| format!("Failed to load run {}", run_id))?;
    Ok(())
}

/// Print updates until the run is terminal; Ctrl-C cancels the run
async fn follow(session: &mut RunSession, step: Option<StepName>) -> Result<()> {
    eprintln!("{}", render::run_overview(session.run()));
    if session.run().status.is_terminal() {
        return Ok(());
    }

    let mut last_status = session.run().status;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = session.next_update() => {
                let Some(update) = update else { break };
                if let Some(line) = render::update_line(&update, step) {
                    println!("{}", line);
                }
                if let SessionUpdate::Snapshot { status } = update {
                    if status != last_status {
                        eprintln!("[status: {} → {}]", last_status, status);
                        last_status = status;
                    }
                    if status.is_terminal() {
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                eprintln!("\n[Interrupted - cancelling run]");
                match session.cancel().await {
                    Ok(Some(status)) => eprintln!("[Run {}]", status),
                    Ok(None) => eprintln!("[Run already {}]", session.run().status),
                    Err(e) => eprintln!("[{}]", e),
                }
                break;
            }
        }
    }

    // Events that arrived together with the final snapshot
    for update in session.drain_updates() {
        if let Some(line) = render::update_line(&update, step) {
            println!("{}", line);
        }
    }

    eprintln!();
    eprintln!("{}", render::run_overview(session.run()));
    if let Some(step) = step {
        eprintln!("{}", render::step_events(session.run(), step));
    }
    Ok(())
}

/// Start a run with the given idea
async fn start_run(idea: Option<String>, input: Option<PathBuf>, detach: bool) -> Result<()> {
    let cfg = config::config()?;
    let (_api, mut session) = open_session(cfg, cfg.downloads.clone());

    let text = match (idea, input) {
        (Some(idea), _) => idea,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read idea file: {}", path.display()))?,
        (None, None) => {
            let cached = session
                .cached_idea()
                .context("No idea provided and no previous idea cached")?;
            eprintln!("Using last idea: {}", cached);
            cached
        }
    };

    let mut buffer = IdeaBuffer::with_limit(cfg.max_idea_chars, None);
    buffer.set_text(&text);
    if buffer.len() < text.chars().count() {
        eprintln!(
            "Warning: idea truncated to {} characters",
            buffer.max_chars()
        );
    }

    let run_id = session.start(buffer.text()).await?;
    println!("{}", run_id);

    if detach {
        return Ok(());
    }
    follow(&mut session, None).await
}

/// Follow an existing run
async fn watch_run(run_id: &str, step: Option<StepName>) -> Result<()> {
    let cfg = config::config()?;
    let (_api, mut session) = open_session(cfg, cfg.downloads.clone());

    attach(&mut session, run_id).await?;
    follow(&mut session, step).await
}

/// Show the status of a run
async fn show_status(run_id: &str) -> Result<()> {
    let cfg = config::config()?;
    let (_api, mut session) = open_session(cfg, cfg.downloads.clone());

    attach(&mut session, run_id).await?;
    println!("{}", render::run_overview(session.run()));

    Ok(())
}

/// Cancel a run
async fn cancel_run(run_id: &str) -> Result<()> {
    let cfg = config::config()?;
    let (_api, mut session) = open_session(cfg, cfg.downloads.clone());

    attach(&mut session, run_id).await?;
    match session.cancel().await? {
        Some(status) => eprintln!("[Run {} {}]", run_id, status),
        None => eprintln!(
            "[Run {} is already {} - nothing to cancel]",
            run_id,
            session.run().status
        ),
    }

    Ok(())
}

/// Rerun one step
async fn regenerate_step(run_id: &str, step: StepName, watch: bool) -> Result<()> {
    let cfg = config::config()?;
    let (_api, mut session) = open_session(cfg, cfg.downloads.clone());

    attach(&mut session, run_id).await?;
    match session.regenerate_step(step).await? {
        Some(status) => eprintln!("[Step {} requeued - run {}]", step, status),
        None => {
            eprintln!("[Step {} cannot be regenerated for this run]", step);
            return Ok(());
        }
    }

    if watch {
        follow(&mut session, None).await?;
    }
    Ok(())
}

/// Fetch and print or save the exported document
async fn export_run(run_id: &str, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;
    let (api, mut session) = open_session(cfg, cfg.downloads.clone());

    attach(&mut session, run_id).await?;
    let run = session.run();
    let Some(id) = run.id.clone().filter(|_| run.can_export()) else {
        anyhow::bail!(
            "Run {} is {}; exports are available once it completes",
            run_id,
            run.status
        );
    };

    let document = match format {
        ExportFormat::Markdown => session.fetch_export().await?.unwrap_or_default(),
        other => api.export_run(&id, other).await?,
    };

    if let Some(path) = output {
        std::fs::write(&path, &document)
            .with_context(|| format!("Failed to write export: {}", path.display()))?;
        eprintln!("[Saved {} export to {}]", format, path.display());
    } else {
        println!("{}", document);
    }

    Ok(())
}

/// Save the run as a notebook
async fn save_notebook(run_id: &str, dir: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;
    let downloads = dir.unwrap_or_else(|| cfg.downloads.clone());
    let (_api, mut session) = open_session(cfg, downloads);

    attach(&mut session, run_id).await?;
    match session.download_notebook().await? {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => anyhow::bail!(
            "Run {} is {}; notebooks are available once it completes",
            run_id,
            session.run().status
        ),
    }
}

/// Show the cached idea
async fn show_idea() -> Result<()> {
    let cfg = config::config()?;
    let store = FileIdeaStore::in_home(&cfg.home);

    match store.load() {
        Some(idea) => println!("{}", idea),
        None => eprintln!("(no idea cached at {})", store.path().display()),
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("TeamFlow Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Service:");
    println!("  API base URL: {}", cfg.api_base_url);
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Idea cache: {}", cfg.idea_cache().display());
    println!("  Downloads:  {}", cfg.downloads.display());
    println!();
    println!("Session:");
    println!("  Poll interval:       {}ms", cfg.session.poll.interval.as_millis());
    println!(
        "  Poll after error:    {}ms",
        cfg.session.poll.error_interval.as_millis()
    );
    println!(
        "  Reconnect delay:     {}ms",
        cfg.session.reconnect.delay.as_millis()
    );
    println!("  Event limit:         {}", cfg.session.event_limit);
    println!("  Max idea characters: {}", cfg.max_idea_chars);

    Ok(())
}
