// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bindery: office-document-to-PDF finalization
//
// Entry point. Initialises logging, loads settings and the job file, and
// drives one finalization run, answering collision prompts on the terminal.

mod job;
mod prompt;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bindery_core::config::{ConfigFile, OutputLocation, RunConfig};
use bindery_document::convert::OfficeConverter;
use bindery_document::{ConverterRegistry, FontLibrary};
use bindery_pipeline::{
    CancellationToken, CollisionConfirmer, CollisionDecision, ConfirmationDesk, ConfirmationResponse, EventSink,
    FinalizationPipeline, FixedDecision, JobRunner, PipelineEvent, PipelineServices, RunSummary,
    confirmation_channel,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::{never, select};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "bindery")]
#[command(version)]
#[command(about = "Finalize office documents into watermarked, numbered, well-named PDFs", long_about = None)]
struct Cli {
    /// Settings file (defaults to bindery/config.json in the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert and finalize every document of a job
    Run {
        /// Job file listing the documents
        #[arg(long, value_name = "FILE")]
        job: PathBuf,

        /// Use a saved preset instead of the current settings
        #[arg(long)]
        preset: Option<String>,

        /// Write every output into this directory
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// What to do when an output file already exists
        #[arg(long, value_enum, default_value = "ask")]
        on_conflict: ConflictPolicy,

        #[command(flatten)]
        tools: ToolArgs,
    },

    /// Render the first selected page of one document with the current overlays
    Preview {
        #[arg(long, value_name = "FILE")]
        job: PathBuf,

        /// 1-based position of the document in the job
        #[arg(long, default_value_t = 1)]
        index: usize,

        #[arg(long, value_name = "FILE")]
        out: PathBuf,

        #[arg(long)]
        preset: Option<String>,

        #[command(flatten)]
        tools: ToolArgs,
    },

    /// Manage named presets
    Presets {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// Print the current settings as JSON
    DumpConfig,
}

#[derive(Subcommand)]
enum PresetAction {
    List,
    /// Save the current settings under NAME
    Save { name: String },
    Delete { name: String },
}

#[derive(Args)]
struct ToolArgs {
    /// Directory of .ttf/.ttc fonts usable as font tokens (repeatable)
    #[arg(long = "fonts-dir", value_name = "DIR")]
    fonts_dirs: Vec<PathBuf>,

    /// Unicode font used when a requested font is unavailable
    #[arg(long, value_name = "FILE")]
    fallback_font: Option<PathBuf>,

    /// Office suite executable used for Word, PowerPoint and Excel
    #[arg(long, default_value = "soffice")]
    office: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConflictPolicy {
    Ask,
    Overwrite,
    Rename,
    Skip,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(ConfigFile::default_path);

    match cli.command {
        Command::Run {
            job,
            preset,
            output_dir,
            on_conflict,
            tools,
        } => {
            let mut config = run_config(&config_path, preset.as_deref())?;
            if let Some(dir) = output_dir {
                config.output = OutputLocation::Directory(dir);
            }
            run(config, &job, on_conflict, &tools)
        }
        Command::Preview {
            job,
            index,
            out,
            preset,
            tools,
        } => {
            let config = run_config(&config_path, preset.as_deref())?;
            preview(config, &job, index, &out, &tools)
        }
        Command::Presets { action } => presets(&config_path, action),
        Command::DumpConfig => {
            let file = ConfigFile::load(&config_path);
            println!("{}", serde_json::to_string_pretty(&file.current)?);
            Ok(())
        }
    }
}

/// Current settings, or a preset, from the settings file.
fn run_config(path: &Path, preset: Option<&str>) -> Result<RunConfig> {
    let mut file = ConfigFile::load(path);
    if let Some(name) = preset {
        file.load_preset(name)?;
    }
    Ok(file.current)
}

fn services(tools: &ToolArgs, confirmer: Arc<dyn CollisionConfirmer>) -> Result<PipelineServices> {
    let mut fonts = FontLibrary::new();
    for dir in &tools.fonts_dirs {
        fonts
            .scan_dir(dir)
            .with_context(|| format!("scanning fonts in {}", dir.display()))?;
    }
    if let Some(path) = &tools.fallback_font {
        fonts.set_fallback(path);
    }
    Ok(PipelineServices {
        converters: ConverterRegistry::with_office(OfficeConverter::new(tools.office.clone())),
        fonts: Arc::new(fonts),
        confirmer,
    })
}

fn run(config: RunConfig, job: &Path, policy: ConflictPolicy, tools: &ToolArgs) -> Result<()> {
    let documents = job::load_job(job)?;
    if documents.is_empty() {
        bail!("job {} lists no documents", job.display());
    }

    let (confirmer, desk): (Arc<dyn CollisionConfirmer>, Option<ConfirmationDesk>) = match policy {
        ConflictPolicy::Ask => {
            let (confirmer, desk) = confirmation_channel();
            (Arc::new(confirmer), Some(desk))
        }
        ConflictPolicy::Overwrite => (Arc::new(FixedDecision(CollisionDecision::Overwrite)), None),
        ConflictPolicy::Rename => (Arc::new(FixedDecision(CollisionDecision::Rename)), None),
        ConflictPolicy::Skip => (Arc::new(FixedDecision(CollisionDecision::Abort)), None),
    };

    let runner = JobRunner::new(services(tools, confirmer)?);
    let handle = runner.start(config, documents.documents().to_vec())?;
    info!(documents = documents.len(), "run started");

    // The runner owns the confirmer, so this channel stays open for the whole run.
    let requests = desk.as_ref().map(|d| d.requests().clone()).unwrap_or_else(never);
    let stdin = io::stdin();
    let finished = loop {
        select! {
            recv(handle.events()) -> event => match event {
                Ok(PipelineEvent::Finished(summary)) => break Some(summary),
                Ok(event) => report(&event),
                Err(_) => break None,
            },
            recv(requests) -> request => match (request, desk.as_ref()) {
                (Ok(request), Some(desk)) => {
                    let decision = prompt::ask(&request, &mut stdin.lock(), &mut io::stderr());
                    if let Err(err) = desk.respond(ConfirmationResponse { id: request.id, decision }) {
                        warn!(%err, "collision answer not delivered");
                    }
                }
                _ => {}
            },
        }
    };
    let joined = handle.join();
    let summary = finished.unwrap_or(joined);
    outcome(&summary)
}

fn report(event: &PipelineEvent) {
    match event {
        PipelineEvent::Log { at, message } => println!("[{}] {message}", at.format("%H:%M:%S")),
        PipelineEvent::Label(text) => debug!(phase = %text, "phase"),
        PipelineEvent::Progress { value, max } => debug!(value, max, "progress"),
        PipelineEvent::Finished(_) => {}
    }
}

fn outcome(summary: &RunSummary) -> Result<()> {
    if let Some(fatal) = &summary.fatal {
        bail!("run aborted: {fatal}");
    }
    if summary.cancelled {
        bail!("run cancelled after {} file(s)", summary.written.len());
    }
    if summary.skipped_documents + summary.skipped_units > 0 {
        warn!(
            documents = summary.skipped_documents,
            outputs = summary.skipped_units,
            "some items were skipped"
        );
    }
    Ok(())
}

fn preview(config: RunConfig, job: &Path, index: usize, out: &Path, tools: &ToolArgs) -> Result<()> {
    let documents = job::load_job(job)?;
    let Some(doc) = index.checked_sub(1).and_then(|i| documents.documents().get(i)) else {
        bail!("job has {} document(s), no document #{index}", documents.len());
    };
    config.validate()?;
    let pipeline = FinalizationPipeline::new(
        Arc::new(config),
        services(tools, Arc::new(FixedDecision(CollisionDecision::Overwrite)))?,
        EventSink::silent(),
        CancellationToken::new(),
    );
    pipeline
        .preview(doc, out)
        .with_context(|| format!("previewing {}", doc.path.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn presets(path: &Path, action: PresetAction) -> Result<()> {
    let mut file = ConfigFile::load(path);
    match action {
        PresetAction::List => {
            for name in file.preset_names() {
                println!("{name}");
            }
            return Ok(());
        }
        PresetAction::Save { name } => file.save_preset(&name)?,
        PresetAction::Delete { name } => {
            if !file.delete_preset(&name) {
                bail!("no preset named '{name}'");
            }
        }
    }
    file.save(path)
        .with_context(|| format!("writing settings to {}", path.display()))
}
