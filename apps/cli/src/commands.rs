//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use besengine_console::{ConsoleClient, HttpSources, ImportOutcome};
use besengine_core::metadata::BuildContext;
use besengine_core::pipeline::{BuildOptions, BuildResult, ProgressReporter, build_task};
use besengine_core::relevance::{QnaValidator, RelevanceValidator};
use besengine_shared::{AppConfig, expand_home, init_config, load_config, load_recipe};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// besengine: package installers as BigFix tasks.
#[derive(Parser)]
#[command(
    name = "besengine",
    version,
    about = "Build BigFix BES task documents from installer recipes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build a `.bes` task from a recipe.
    Build {
        /// Recipe TOML file.
        recipe: PathBuf,

        /// Output directory (defaults to `defaults.cache_dir`).
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Upload the installer to the console and prefetch it from there.
        #[arg(long)]
        upload: bool,
    },

    /// Upload a file to the console and print its prefetch statement.
    Upload {
        file: PathBuf,

        /// File name used in the prefetch (defaults to the uploaded name).
        #[arg(long)]
        filename: Option<String>,
    },

    /// Import a `.bes` task into a custom site, skipping duplicates.
    Import {
        bes_file: PathBuf,

        /// Custom site name.
        #[arg(long)]
        site: String,

        /// Task title to check for duplicates (defaults to the file stem).
        #[arg(long)]
        title: Option<String>,

        /// Print the import summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check relevance expressions with the QnA evaluator.
    CheckRelevance {
        #[arg(required = true)]
        expressions: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "besengine=info",
        1 => "besengine=debug",
        _ => "besengine=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            recipe,
            cache_dir,
            upload,
        } => cmd_build(&recipe, cache_dir, upload).await,
        Command::Upload { file, filename } => cmd_upload(&file, filename.as_deref()).await,
        Command::Import {
            bes_file,
            site,
            title,
            json,
        } => cmd_import(&bes_file, &site, title.as_deref(), json).await,
        Command::CheckRelevance { expressions } => cmd_check_relevance(&expressions),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(recipe_path: &Path, cache_dir: Option<PathBuf>, upload: bool) -> Result<()> {
    let config = load_config()?;
    let mut recipe = load_recipe(recipe_path)?;

    // Installer paths are relative to the recipe file.
    let installer = expand_home(&recipe.installer);
    if installer.is_relative() {
        let base = recipe_path.parent().unwrap_or(Path::new("."));
        recipe.installer = base.join(installer).to_string_lossy().into_owned();
    } else {
        recipe.installer = installer.to_string_lossy().into_owned();
    }

    if upload {
        let client = ConsoleClient::from_config(&config.console)?;
        let uploaded = client.upload(Path::new(&recipe.installer)).await?;
        recipe.prefetch = Some(uploaded.prefetch(recipe.filename.as_deref()));
    }

    let options = BuildOptions {
        cache_dir: cache_dir.unwrap_or_else(|| expand_home(&config.defaults.cache_dir)),
        default_category: config.defaults.category.clone(),
        qna_path: expand_home(&config.defaults.qna_path),
    };
    let ctx = BuildContext::now(invoking_user());
    let sources = HttpSources::new(&config.defaults.user_agent, config.console.timeout_secs)?;

    info!(recipe = %recipe_path.display(), name = %recipe.name, version = %recipe.version, "building task");

    let reporter = CliProgress::new();
    let result = build_task(&recipe, &options, &ctx, &sources, &reporter).await?;

    println!();
    println!("  Task built successfully!");
    println!("  Title:    {}", result.title);
    println!("  Actions:  {}", result.action_count);
    println!("  Download: {}", result.download_url);
    println!("  File:     {}", result.bes_file.display());
    println!();

    Ok(())
}

async fn cmd_upload(file: &Path, filename: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let client = ConsoleClient::from_config(&config.console)?;

    let uploaded = client.upload(file).await?;

    println!("{}", uploaded.prefetch(filename));
    Ok(())
}

async fn cmd_import(bes_file: &Path, site: &str, title: Option<&str>, json: bool) -> Result<()> {
    let title = match title {
        Some(t) => t.to_string(),
        None => bes_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| eyre!("cannot derive a task title from '{}'", bes_file.display()))?,
    };

    let config = load_config()?;
    let client = ConsoleClient::from_config(&config.console)?;

    match client.import_task(bes_file, site, &title).await? {
        ImportOutcome::Duplicate(task) => {
            println!(
                "Duplicate, skipping import: [{}] {} - {}",
                task.id,
                task.name,
                task.last_modified.as_deref().unwrap_or("unknown")
            );
        }
        ImportOutcome::Imported(task) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&task.summary())?);
            } else {
                let summary = task.summary();
                println!();
                println!("  {}", summary.summary_text);
                for field in &summary.report_fields {
                    let value = summary.data.get(field).map(String::as_str).unwrap_or("");
                    println!("  {field:<10} {value}");
                }
                println!();
            }
        }
    }

    Ok(())
}

fn cmd_check_relevance(expressions: &[String]) -> Result<()> {
    let config = load_config()?;
    let qna = expand_home(&config.defaults.qna_path);
    if !qna.is_file() {
        return Err(eyre!(
            "QnA evaluator not found at '{}'. Set defaults.qna_path in besengine.toml",
            qna.display()
        ));
    }

    let validator = QnaValidator::new(qna);
    for expression in expressions {
        let check = validator.validate(expression);
        match check.error_message {
            Some(message) => println!("WARN  {expression}\n      {message}"),
            None => println!("OK    {expression}"),
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

/// Recorded as the task's `SourceID`.
fn invoking_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &BuildResult) {
        self.spinner.finish_and_clear();
    }
}
