//! Strata CLI - pluggable three-stage data export

mod config;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use config::{Config, Preset, list_presets};
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata::{
    Exporter, FanoutSink, Layer, ObservationSink, PipelineDef, RecordingSink, Registry, RoleKind,
    Stage, TracingSink,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Pluggable three-stage data export", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/strata/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more (info level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log only errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered stages per role
    List,

    /// List available presets
    Presets,

    /// Show the stage configuration a selection resolves to
    Describe {
        #[command(flatten)]
        selection: Selection,
    },

    /// Export input through a pipeline
    Export {
        /// Input text ("-" or omitted reads stdin)
        input: Option<String>,

        #[command(flatten)]
        selection: Selection,

        /// Print decorator observations as JSON lines on stderr
        #[arg(long)]
        observations: bool,
    },

    /// Export input through a pipeline definition file
    Run {
        /// Pipeline definition (YAML, TOML, or JSON)
        pipeline: PathBuf,

        /// Input text ("-" or omitted reads stdin)
        input: Option<String>,

        /// Print decorator observations as JSON lines on stderr
        #[arg(long)]
        observations: bool,
    },
}

/// Stage selection shared by `describe` and `export`.
#[derive(Args)]
struct Selection {
    /// Use a preset (web, archive, legacy-xml, or user-defined)
    #[arg(long)]
    preset: Option<String>,

    /// Transform stage key
    #[arg(long)]
    transform: Option<String>,

    /// Compression stage key
    #[arg(long)]
    compression: Option<String>,

    /// Format stage key
    #[arg(long)]
    format: Option<String>,

    /// Retry every stage up to N attempts
    #[arg(long, value_name = "N")]
    retry: Option<u32>,

    /// Fail any stage that takes longer than MS milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Time every stage call
    #[arg(long)]
    log: bool,

    /// Apply the timeout to each retry attempt instead of the whole stage
    #[arg(long)]
    per_attempt_timeout: bool,

    /// Load the stages from a definition file; layer flags still apply
    #[arg(long, value_name = "FILE", conflicts_with_all = ["preset", "transform", "compression", "format"])]
    pipeline: Option<PathBuf>,
}

impl Selection {
    /// Merge built-in fallbacks, config defaults, the preset and flags.
    fn resolve(&self, config: &Config) -> Result<Preset> {
        let mut settings = Preset {
            transform: Some("json".into()),
            compression: Some("none".into()),
            format: Some("plain".into()),
            ..Default::default()
        };
        settings.merge(&config.defaults.stages);

        if let Some(name) = &self.preset {
            let preset = config
                .get_preset(name)
                .with_context(|| format!("Unknown preset: {}", name))?;
            settings.merge(&preset);
        }

        settings.merge(&self.flags());
        Ok(settings)
    }

    /// Settings given directly on the command line.
    fn flags(&self) -> Preset {
        Preset {
            transform: self.transform.clone(),
            compression: self.compression.clone(),
            format: self.format.clone(),
            log: self.log.then_some(true),
            retry: self.retry,
            timeout_ms: self.timeout_ms,
            per_attempt_timeout: self.per_attempt_timeout.then_some(true),
        }
    }

    fn definition(&self, config: &Config) -> Result<PipelineDef> {
        if let Some(path) = &self.pipeline {
            // Layer flags go outside the layers the file declares.
            return Ok(with_layers(load_definition(path)?, &self.flags()));
        }

        let settings = self.resolve(config)?;
        Ok(definition_from(&settings))
    }
}

/// Build a definition from merged settings.
fn definition_from(settings: &Preset) -> PipelineDef {
    let key = |k: &Option<String>| k.clone().unwrap_or_default();
    let def = PipelineDef::new(
        key(&settings.transform),
        key(&settings.compression),
        key(&settings.format),
    );
    with_layers(def, settings)
}

/// Add the decorator layers `settings` asks for to every slot.
///
/// Layers go innermost first: logging, then retry around it, then the
/// timeout around the whole retry loop. With `per_attempt_timeout` the
/// timeout sits inside the retry instead.
fn with_layers(mut def: PipelineDef, settings: &Preset) -> PipelineDef {
    if settings.log.unwrap_or(false) {
        def = def.layer_all(Layer::Logging);
    }

    let retry = settings.retry.map(|attempts| Layer::Retry {
        attempts,
        delay_ms: 0,
    });
    let timeout = settings
        .timeout_ms
        .map(|limit_ms| Layer::Timeout { limit_ms });

    let ordered = if settings.per_attempt_timeout.unwrap_or(false) {
        [timeout, retry]
    } else {
        [retry, timeout]
    };
    for layer in ordered.into_iter().flatten() {
        def = def.layer_all(layer);
    }
    def
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match Config::load(cli.config.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let verbose = cli.verbose || (config.defaults.verbose && !cli.quiet);
    let quiet = cli.quiet || (config.defaults.quiet && !cli.verbose);
    init_tracing(verbose, quiet);

    if let Some(e) = config_error {
        tracing::warn!("{}", e);
    }

    let registry = Registry::new();
    strata_formats::register_all(&registry);

    match cli.command {
        Commands::List => cmd_list(&registry),
        Commands::Presets => cmd_presets(&config),
        Commands::Describe { selection } => cmd_describe(&registry, &config, &selection),
        Commands::Export {
            input,
            selection,
            observations,
        } => {
            let def = selection.definition(&config)?;
            cmd_export(&registry, &def, input.as_deref(), observations)
        }
        Commands::Run {
            pipeline,
            input,
            observations,
        } => {
            let def = load_definition(&pipeline)?;
            cmd_export(&registry, &def, input.as_deref(), observations)
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn cmd_list(registry: &Registry) -> Result<()> {
    println!("Available stages:\n");

    for role in RoleKind::ALL {
        println!("  {}:", role);
        for key in registry.keys(role) {
            println!("    {}", key);
        }
        println!();
    }

    println!("Total: {} stages", registry.len());
    Ok(())
}

fn cmd_presets(config: &Config) -> Result<()> {
    println!("Available presets:\n");

    for (name, description) in list_presets(config) {
        println!("  {:<12} {}", name, description);
    }

    Ok(())
}

fn cmd_describe(registry: &Registry, config: &Config, selection: &Selection) -> Result<()> {
    let def = selection.definition(config)?;
    let pipeline = def
        .build(registry, Arc::new(TracingSink))
        .context("Failed to build pipeline")?;

    println!("Pipeline:");
    for (position, label) in pipeline.describe_configuration() {
        println!("  {}. {}", position, label);
    }

    Ok(())
}

fn cmd_export(
    registry: &Registry,
    def: &PipelineDef,
    input: Option<&str>,
    observations: bool,
) -> Result<()> {
    let recorder = observations.then(RecordingSink::shared);
    let sink: Arc<dyn ObservationSink> = match &recorder {
        Some(recorder) => Arc::new(
            FanoutSink::new()
                .with(Arc::new(TracingSink))
                .with(recorder.clone()),
        ),
        None => Arc::new(TracingSink),
    };

    let pipeline = def
        .build(registry, sink)
        .context("Failed to build pipeline")?;
    tracing::info!(
        transform = %pipeline.transform().describe(),
        compression = %pipeline.compression().describe(),
        format = %pipeline.format().describe(),
        "pipeline ready"
    );

    let input = read_input(input)?;
    let result = Exporter::new(pipeline).export(&input);

    if let Some(recorder) = recorder {
        for event in recorder.events() {
            eprintln!("{}", serde_json::to_string(&event)?);
        }
    }

    let output = result.context("Export failed")?;
    println!("{}", output);
    Ok(())
}

fn load_definition(path: &Path) -> Result<PipelineDef> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    let hint = path.to_string_lossy();
    PipelineDef::from_bytes(&data, Some(&hint))
        .with_context(|| format!("Failed to parse pipeline file: {}", path.display()))
}

fn read_input(input: Option<&str>) -> Result<String> {
    match input {
        Some(text) if text != "-" => Ok(text.to_string()),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            if input.is_none() && buf.is_empty() {
                bail!("No input given (pass text or pipe it on stdin)");
            }
            Ok(buf)
        }
    }
}
