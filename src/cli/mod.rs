//! Command-line front end: argument parsing and command dispatch.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

use crate::entities::expand::expand;
use crate::entities::medicine::{Medicine, extract_categories, load_catalog};
use crate::entities::search::SearchSession;
use crate::render;
use crate::utils::settings::{self, Settings};

const LOAD_FAILED: &str = "加载药品数据失败，请检查网络或数据源。";
const AI_SETUP_HINT: &str = "> 提示: AI 语义搜索需要 Gemini API Key，本次已按原始关键词搜索。\n> 运行 `refmed config set-key <KEY>` 或设置 GEMINI_API_KEY 环境变量。\n\n";

#[derive(Parser, Debug)]
#[command(
    name = "refmed",
    version,
    about = "Browse the reference-listed (originator) drug catalog"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output JSON instead of Markdown
    #[arg(long, global = true)]
    pub json: bool,

    /// Dataset feed URL (default: REFMED_DATA_URL or the public jsDelivr feed)
    #[arg(long, global = true)]
    pub data_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the catalog by name, company, category, or tag
    Search {
        /// Free-text query (omit to list everything)
        query: Option<String>,

        /// Expand the query into related keywords with Gemini
        #[arg(long)]
        ai: bool,

        /// Only show records carrying this exact tag
        #[arg(long)]
        tag: Option<String>,

        /// Maximum number of result cards to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List therapeutic categories in pinyin order
    Categories,

    /// Show tag frequencies for the records matching a query
    Tags {
        /// Free-text query (omit for the whole catalog)
        query: Option<String>,

        /// Expand the query into related keywords with Gemini
        #[arg(long)]
        ai: bool,
    },

    /// Print the keyword set Gemini produces for a query
    Expand {
        /// Symptom, indication, or drug description
        query: String,
    },

    /// Manage the locally stored API key and endpoint
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective settings (key masked)
    Show,
    /// Store the Gemini API key (empty string removes it)
    SetKey { key: String },
    /// Store an alternate Gemini base URL, e.g. a regional proxy (empty string removes it)
    SetBase { url: String },
    /// Remove all stored settings
    Clear,
}

#[derive(Serialize)]
struct SettingsReport {
    api_key: Option<String>,
    base_url: Option<String>,
    path: String,
    ai_available: bool,
}

#[derive(Serialize)]
struct KeywordsReport<'a> {
    query: &'a str,
    keywords: &'a [String],
}

async fn load_medicines(data_url: Option<&str>) -> anyhow::Result<Vec<Medicine>> {
    load_catalog(data_url).await.context(LOAD_FAILED)
}

struct QueryRun {
    medicines: Vec<Medicine>,
    session: SearchSession,
    ai_unavailable: bool,
}

/// Loads the catalog and applies one submission, expanding when AI is requested and configured.
async fn run_query(
    data_url: Option<&str>,
    settings: &Settings,
    query: &str,
    ai: bool,
    tag: Option<&str>,
) -> anyhow::Result<QueryRun> {
    let medicines = load_medicines(data_url).await?;
    let credentials = settings.credentials();

    let mut session = SearchSession::new();
    let submission = session.submit(query, ai, credentials.is_some());
    if submission.needs_expansion {
        let categories = extract_categories(&medicines);
        let keywords = expand(&submission.query, &categories, credentials.as_ref()).await;
        session.apply_expansion(submission.generation, keywords);
    }
    session.select_tag(tag.map(str::trim).filter(|t| !t.is_empty()));

    Ok(QueryRun {
        medicines,
        session,
        ai_unavailable: ai && credentials.is_none() && !query.trim().is_empty(),
    })
}

fn with_hint(show: bool, body: String) -> String {
    if show {
        format!("{AI_SETUP_HINT}{body}")
    } else {
        body
    }
}

async fn run_config(command: ConfigCommand, json: bool) -> anyhow::Result<String> {
    let path = settings::settings_path();
    let effective = match command {
        ConfigCommand::Show => settings::load().await?.with_env_overrides(),
        ConfigCommand::SetKey { key } => {
            let mut stored = settings::load().await?;
            stored.set_api_key(&key);
            settings::save(&stored).await?;
            stored.with_env_overrides()
        }
        ConfigCommand::SetBase { url } => {
            let mut stored = settings::load().await?;
            stored.set_base_url(&url);
            settings::save(&stored).await?;
            stored.with_env_overrides()
        }
        ConfigCommand::Clear => {
            settings::save(&Settings::default()).await?;
            Settings::default().with_env_overrides()
        }
    };

    if json {
        return Ok(render::json::to_pretty(&SettingsReport {
            api_key: effective.masked_api_key(),
            base_url: effective.base_url.clone(),
            path: path.display().to_string(),
            ai_available: effective.ai_available(),
        })?);
    }
    Ok(render::markdown::settings_markdown(&effective, &path)?)
}

/// Executes a parsed command and returns the text to print.
///
/// # Errors
///
/// Returns an error when the catalog cannot be loaded, settings cannot be
/// read or written, or rendering fails. Keyword expansion never errors.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let json = cli.json;
    let data_url = cli.data_url.as_deref();

    match cli.command {
        Commands::Config { command } => run_config(command, json).await,
        Commands::Categories => {
            let medicines = load_medicines(data_url).await?;
            let categories = extract_categories(&medicines);
            if json {
                return Ok(render::json::to_pretty(&categories)?);
            }
            Ok(render::markdown::categories_markdown(&categories)?)
        }
        Commands::Search {
            query,
            ai,
            tag,
            limit,
        } => {
            let settings = settings::load().await?.with_env_overrides();
            let query = query.unwrap_or_default();
            let run = run_query(data_url, &settings, &query, ai, tag.as_deref()).await?;
            let mut view = run.session.view(&run.medicines);
            if json {
                view.truncate_results(limit);
                return Ok(render::json::to_pretty(&view)?);
            }
            let body = render::markdown::search_markdown(&view, limit)?;
            Ok(with_hint(run.ai_unavailable, body))
        }
        Commands::Tags { query, ai } => {
            let settings = settings::load().await?.with_env_overrides();
            let query = query.unwrap_or_default();
            let run = run_query(data_url, &settings, &query, ai, None).await?;
            let view = run.session.view(&run.medicines);
            if json {
                return Ok(render::json::to_pretty(&view.tags)?);
            }
            let body = render::markdown::tags_markdown(&query, &view.tags)?;
            Ok(with_hint(run.ai_unavailable, body))
        }
        Commands::Expand { query } => {
            let settings = settings::load().await?.with_env_overrides();
            let credentials = settings.credentials();
            let categories = match credentials {
                Some(_) => match load_catalog(data_url).await {
                    Ok(medicines) => extract_categories(&medicines),
                    Err(err) => {
                        warn!("Catalog unavailable, expanding without category hints: {err}");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            let keywords = expand(&query, &categories, credentials.as_ref()).await;
            if json {
                return Ok(render::json::to_pretty(&KeywordsReport {
                    query: &query,
                    keywords: &keywords,
                })?);
            }
            let body = render::markdown::keywords_markdown(&query, &keywords)?;
            Ok(with_hint(credentials.is_none(), body))
        }
    }
}
