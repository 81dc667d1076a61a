use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Local};
use chatlist_core::{
    AdapterRegistry, CredentialResolver, DispatchBatch, DispatchResult, FanOutCoordinator,
    ModelConfig, ModelNameResolver, PromptImprover, PromptRequest, ProviderKind,
    RequestDispatcher, category_or_general, sort_by_model_id,
};
use chatlist_store::{ChatDb, ExportFormat, ModelUpdate, NewModel};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::ChatListConfig;

#[derive(Parser)]
#[command(name = "chatlist")]
#[command(version)]
#[command(about = "Send one prompt to several LLMs and compare the answers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Show the model identifier a display name resolves to
    Resolve {
        name: String,
        /// Provider kind (openai, deepseek, groq, openrouter)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Manage model configs
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Send a prompt to the active models (or the ones given with --model)
    Send {
        prompt: String,
        /// Model id, repeatable
        #[arg(short, long = "model")]
        models: Vec<i64>,
        /// Save the prompt and every successful response
        #[arg(long)]
        save: bool,
        /// Tags stored with the prompt
        #[arg(long)]
        tags: Option<String>,
        /// Also write the full batch, failures included, as JSON
        #[arg(long)]
        batch_out: Option<PathBuf>,
    },

    /// Ask one model for an improved prompt and alternatives
    Improve {
        prompt: String,
        #[arg(short, long)]
        model: i64,
        /// code, analysis, creative or general
        #[arg(long)]
        category: Option<String>,
    },

    /// Browse saved prompts
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },

    /// List saved results
    Results {
        /// Only results for this prompt id
        #[arg(long)]
        prompt: Option<i64>,
    },

    /// Print a batch file written by `send --batch-out`
    Show {
        batch: PathBuf,
    },

    /// Export saved results to Markdown or JSON
    Export {
        /// markdown or json (defaults to the `default_export_format` setting)
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Output file (defaults to `chatlist_export_<timestamp>.<ext>`)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Only results for this prompt id
        #[arg(long)]
        prompt: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ModelsAction {
    List,
    Add {
        name: String,
        #[arg(long)]
        url: String,
        /// Environment variable holding the API key
        #[arg(long)]
        key_var: String,
        /// Provider kind; detected from the URL when omitted
        #[arg(long)]
        provider: Option<String>,
        /// Add the model disabled
        #[arg(long)]
        inactive: bool,
    },
    Remove {
        id: i64,
    },
    Enable {
        id: i64,
    },
    Disable {
        id: i64,
    },
}

#[derive(Subcommand)]
enum PromptsAction {
    List,
    Search {
        query: Option<String>,
        #[arg(long)]
        tags: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Resolve { name, provider } => cmd_resolve(&cli.config, &name, provider).await,
        Commands::Models { action } => cmd_models(&cli.config, action).await,
        Commands::Send {
            prompt,
            models,
            save,
            tags,
            batch_out,
        } => cmd_send(&cli.config, prompt, &models, save, tags, batch_out).await,
        Commands::Improve {
            prompt,
            model,
            category,
        } => cmd_improve(&cli.config, &prompt, model, category).await,
        Commands::Prompts { action } => cmd_prompts(&cli.config, action).await,
        Commands::Results { prompt } => cmd_results(&cli.config, prompt).await,
        Commands::Export {
            format,
            out,
            prompt,
        } => cmd_export(&cli.config, format, out, prompt).await,
        Commands::Show { batch } => cmd_show(&batch).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    let cfg = ChatListConfig::load(&Some(config_path.clone()))?;
    open_db(&cfg)?;

    println!("ChatList initialized at {}", config_dir.display());
    println!(
        "Put API keys in your environment or a .env file; models reference them by variable name."
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ChatListConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_resolve(
    config_path: &Option<PathBuf>,
    name: &str,
    provider: Option<String>,
) -> Result<()> {
    let cfg = ChatListConfig::load(config_path)?;
    let resolver = name_resolver(&cfg)?;
    let kind = provider.as_deref().map(parse_provider).transpose()?;
    println!("{}", resolver.resolve(name, kind));
    Ok(())
}

async fn cmd_models(config_path: &Option<PathBuf>, action: ModelsAction) -> Result<()> {
    let cfg = ChatListConfig::load(config_path)?;
    let db = open_db(&cfg)?;

    match action {
        ModelsAction::List => {
            let models = db.list_models().await?;
            if models.is_empty() {
                println!("No models configured.");
            }
            for m in models {
                println!(
                    "{:>4}  {}  {:<24} {:<10} {:<20} {}",
                    m.id,
                    if m.is_active { "*" } else { " " },
                    m.display_name,
                    m.provider_kind.as_str(),
                    m.credential_reference,
                    m.api_base_url
                );
            }
        }
        ModelsAction::Add {
            name,
            url,
            key_var,
            provider,
            inactive,
        } => {
            let id = db
                .create_model(NewModel {
                    display_name: name.clone(),
                    api_base_url: url,
                    credential_reference: key_var,
                    provider_kind: provider.as_deref().map(parse_provider).transpose()?,
                    is_active: !inactive,
                })
                .await?;
            println!("Added model {} with id {}", name, id);
        }
        ModelsAction::Remove { id } => {
            if !db.delete_model(id).await? {
                bail!("Model {} not found", id);
            }
            println!("Removed model {}", id);
        }
        ModelsAction::Enable { id } => set_active(&db, id, true).await?,
        ModelsAction::Disable { id } => set_active(&db, id, false).await?,
    }
    Ok(())
}

async fn set_active(db: &ChatDb, id: i64, active: bool) -> Result<()> {
    db.update_model(id, ModelUpdate::active(active)).await?;
    println!(
        "Model {} {}",
        id,
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn cmd_send(
    config_path: &Option<PathBuf>,
    prompt: String,
    model_ids: &[i64],
    save: bool,
    tags: Option<String>,
    batch_out: Option<PathBuf>,
) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }
    let cfg = ChatListConfig::load(config_path)?;
    load_env_file(&cfg);
    let db = open_db(&cfg)?;

    let configs = select_models(&db, model_ids).await?;
    if configs.is_empty() {
        bail!("No active models. Add one with `chatlist models add` or enable an existing one.");
    }

    let credentials =
        CredentialResolver::from_env().with_shared_key_var(cfg.credentials.shared_key_var.clone());
    let resolved = credentials.resolve_all(&configs);

    let coordinator = FanOutCoordinator::new(build_dispatcher(&cfg)?, cfg.fanout_config());
    let mut request = PromptRequest::new(prompt);
    if let Some(tags) = tags {
        request = request.with_tags(tags);
    }

    let (tx, mut rx) = mpsc::channel::<DispatchResult>(configs.len().max(1));
    let progress = tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            let mark = if result.is_success() { "done" } else { "failed" };
            eprintln!("  {} {}", mark, result.model_display_name());
        }
    });

    let mut results = coordinator
        .run_with_progress(resolved, &request, Some(tx))
        .await;
    if let Err(e) = progress.await {
        debug!("Progress printer ended abnormally: {}", e);
    }
    sort_by_model_id(&mut results);

    for result in &results {
        print_result(result);
    }

    if save {
        let prompt_id = db
            .create_prompt(&request.text, request.tags.as_deref())
            .await?;
        let mut saved = 0;
        for result in results.iter().filter(|r| r.is_success()) {
            db.save_result(prompt_id, result).await?;
            saved += 1;
        }
        println!("Saved prompt {} with {} response(s)", prompt_id, saved);
    }

    if let Some(path) = batch_out {
        chatlist_store::write_batch(&DispatchBatch::new(request, results), &path)?;
        println!("Wrote batch to {}", path.display());
    }
    Ok(())
}

async fn select_models(db: &ChatDb, ids: &[i64]) -> Result<Vec<ModelConfig>> {
    if ids.is_empty() {
        return db.list_active_models().await;
    }
    let mut models = Vec::with_capacity(ids.len());
    for &id in ids {
        let model = db
            .get_model(id)
            .await?
            .ok_or_else(|| anyhow!("Model {} not found", id))?;
        models.push(model);
    }
    Ok(models)
}

fn print_result(result: &DispatchResult) {
    println!("=== {} (#{}) ===", result.model_display_name(), result.model_id());
    match (result.response_text(), result.error_message()) {
        (Some(text), _) => {
            println!("{}", text);
            let mut meta = Vec::new();
            if let Some(tokens) = result.tokens_used() {
                meta.push(format!("{} tokens", tokens));
            }
            if let Some(secs) = result.response_time_seconds() {
                meta.push(format!("{:.2}s", secs));
            }
            if !meta.is_empty() {
                println!("[{}]", meta.join(", "));
            }
        }
        (None, Some(message)) => {
            let kind = result
                .error_kind()
                .map(|k| k.to_string())
                .unwrap_or_default();
            println!("ERROR ({}): {}", kind, message);
        }
        (None, None) => {}
    }
    println!();
}

async fn cmd_improve(
    config_path: &Option<PathBuf>,
    prompt: &str,
    model_id: i64,
    category: Option<String>,
) -> Result<()> {
    let cfg = ChatListConfig::load(config_path)?;
    load_env_file(&cfg);
    let db = open_db(&cfg)?;

    let config = db
        .get_model(model_id)
        .await?
        .ok_or_else(|| anyhow!("Model {} not found", model_id))?;
    let model = CredentialResolver::from_env()
        .with_shared_key_var(cfg.credentials.shared_key_var.clone())
        .resolve(&config);

    let improver = PromptImprover::new(build_dispatcher(&cfg)?).with_timeout(cfg.improve_timeout());
    let category = category_or_general(category.as_deref());
    let result = improver.improve(&model, prompt, Some(category)).await?;

    println!("Improved prompt:\n\n{}\n", result.improved_text);
    for (i, alt) in result.alternatives.iter().enumerate() {
        println!("Alternative {}:\n\n{}\n", i + 1, alt);
    }
    Ok(())
}

async fn cmd_prompts(config_path: &Option<PathBuf>, action: PromptsAction) -> Result<()> {
    let cfg = ChatListConfig::load(config_path)?;
    let db = open_db(&cfg)?;

    let prompts = match action {
        PromptsAction::List => db.list_prompts().await?,
        PromptsAction::Search { query, tags } => {
            db.search_prompts(query.as_deref(), tags.as_deref()).await?
        }
        PromptsAction::Delete { id } => {
            if !db.delete_prompt(id).await? {
                bail!("Prompt {} not found", id);
            }
            println!("Deleted prompt {} and its saved results", id);
            return Ok(());
        }
    };

    if prompts.is_empty() {
        println!("No prompts found.");
    }
    for p in prompts {
        let tags = p.tags.map(|t| format!(" [{}]", t)).unwrap_or_default();
        println!(
            "{:>4}  {}{}  {}",
            p.id,
            p.date.format("%Y-%m-%d %H:%M"),
            tags,
            first_line(&p.text)
        );
    }
    Ok(())
}

async fn cmd_results(config_path: &Option<PathBuf>, prompt: Option<i64>) -> Result<()> {
    let cfg = ChatListConfig::load(config_path)?;
    let db = open_db(&cfg)?;

    let results = match prompt {
        Some(id) => db.list_results_by_prompt(id).await?,
        None => db.list_results().await?,
    };
    if results.is_empty() {
        println!("No saved results.");
    }
    for r in results {
        println!(
            "{:>4}  {}  {:<20} {}  ->  {}",
            r.id,
            r.saved_at.format("%Y-%m-%d %H:%M"),
            r.model_name,
            first_line(&r.prompt_text),
            first_line(&r.response)
        );
    }
    Ok(())
}

async fn cmd_export(
    config_path: &Option<PathBuf>,
    format: Option<ExportFormat>,
    out: Option<PathBuf>,
    prompt: Option<i64>,
) -> Result<()> {
    let cfg = ChatListConfig::load(config_path)?;
    let db = open_db(&cfg)?;

    let format = match format {
        Some(format) => format,
        None => db
            .get_setting("default_export_format")
            .await?
            .and_then(|f| f.parse().ok())
            .unwrap_or_default(),
    };
    let results = match prompt {
        Some(id) => db.list_results_by_prompt(id).await?,
        None => db.list_results().await?,
    };
    if results.is_empty() {
        warn!("No saved results to export");
    }

    let out = out.unwrap_or_else(|| default_export_path(format, Local::now()));
    chatlist_store::export_results(&results, format, &out)?;
    println!("Exported {} result(s) to {}", results.len(), out.display());
    Ok(())
}

fn default_export_path(format: ExportFormat, now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!(
        "chatlist_export_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

async fn cmd_show(path: &Path) -> Result<()> {
    let batch = chatlist_store::read_batch(path)?;
    println!(
        "Prompt ({}): {}
",
        batch.exported_at.format("%Y-%m-%d %H:%M"),
        batch.prompt.text
    );
    for result in &batch.results {
        print_result(result);
    }
    Ok(())
}

fn open_db(cfg: &ChatListConfig) -> Result<ChatDb> {
    let db_path = cfg.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
    }
    ChatDb::new(&db_path).context("Failed to open chatlist database")
}

/// Load the configured `.env`, or `./.env` when none is configured
fn load_env_file(cfg: &ChatListConfig) {
    match cfg.env_file() {
        Some(path) => match dotenvy::from_path(&path) {
            Ok(()) => debug!("Loaded environment from {}", path.display()),
            Err(e) => warn!("Could not load env file {}: {}", path.display(), e),
        },
        None => {
            if let Ok(path) = dotenvy::dotenv() {
                debug!("Loaded environment from {}", path.display());
            }
        }
    }
}

fn name_resolver(cfg: &ChatListConfig) -> Result<ModelNameResolver> {
    match cfg.alias_file() {
        Some(path) => ModelNameResolver::from_path(&path)
            .with_context(|| format!("Failed to load alias table {}", path.display())),
        None => Ok(ModelNameResolver::builtin()),
    }
}

fn build_dispatcher(cfg: &ChatListConfig) -> Result<RequestDispatcher> {
    let resolver = Arc::new(name_resolver(cfg)?);
    let registry = AdapterRegistry::standard(
        reqwest::Client::new(),
        resolver,
        cfg.openrouter_headers(),
    );
    Ok(RequestDispatcher::new(Arc::new(registry)).with_policy(cfg.retry_policy()))
}

fn parse_provider(name: &str) -> Result<ProviderKind> {
    const VALID: &str = "openai, deepseek, groq, openrouter, unknown";
    let kind = name.parse::<ProviderKind>().unwrap_or_default();
    if kind == ProviderKind::Unknown && !name.trim().eq_ignore_ascii_case("unknown") {
        bail!("Unknown provider '{}' (expected one of: {})", name, VALID);
    }
    Ok(kind)
}

fn first_line(text: &str) -> String {
    const MAX_CHARS: usize = 60;
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > MAX_CHARS {
        let cut: String = line.chars().take(MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
