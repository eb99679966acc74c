mod agent;
mod aggregator;
mod conversation_model;
mod error;
mod evaluation;
mod generator;
mod legacy_backend;
mod model_config;
mod samples;
mod service;
mod storage;
mod ui;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use conversation_model::create_model;
use evaluation::ResponseLabel;
use generator::{GeneratorConfig, ResponseGenerator};
use legacy_backend::{HttpLegacyBackend, LegacyBackend};
use model_config::ModelConfig;
use service::{ComparisonRatings, EvaluationRequest, EvaluationService, GradeRequest};
use storage::{EvaluationStore, memory::MemoryStore, sqlite::SqliteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Memory,
    Sqlite,
}

#[derive(Parser)]
#[command(name = "ab-evals")]
#[command(about = "Side-by-side human evaluation of two AI agent responses")]
pub struct Cli {
    #[arg(long, env = "AB_EVALS_PROVIDER", default_value = "openai", global = true)]
    pub provider: String,

    #[arg(long, env = "AB_EVALS_MODEL", default_value = "gpt-3.5-turbo", global = true)]
    pub model: String,

    #[arg(long, value_enum, env = "AB_EVALS_STORAGE", default_value = "sqlite", global = true)]
    pub storage: StorageKind,

    #[arg(
        long,
        env = "AB_EVALS_DATABASE_URL",
        default_value = "sqlite://ab_evals.db",
        global = true
    )]
    pub database_url: String,

    #[arg(long, env = "BACKEND_API_URL", global = true)]
    pub legacy_url: Option<String>,

    #[arg(long, env = "BACKEND_API_TOKEN", hide_env_values = true, global = true)]
    pub legacy_token: Option<String>,

    #[arg(long, default_value_t = 30, global = true)]
    pub primary_timeout_secs: u64,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate two responses for a document and store them as a new session
    Compare {
        /// Path to the document, or `-` for stdin
        #[arg(long, conflicts_with = "sample", required_unless_present = "sample")]
        document: Option<PathBuf>,
        /// Use one of the built-in sample emails
        #[arg(long)]
        sample: Option<u32>,
        #[arg(long)]
        user: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Rate both responses of a session
    Rate {
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        score_a: i32,
        #[arg(long)]
        score_b: i32,
        #[arg(long)]
        comment_a: Option<String>,
        #[arg(long)]
        comment_b: Option<String>,
    },
    /// Record a single grade
    Grade {
        #[arg(long)]
        response: Uuid,
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        score: i32,
        /// `1`, `2`, `Response 1` or `Response 2`
        #[arg(long)]
        label: ResponseLabel,
        #[arg(long)]
        feedback: Option<String>,
    },
    Stats {
        #[arg(long)]
        user: String,
        #[arg(long)]
        json: bool,
    },
    Sessions {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    Show {
        #[arg(long)]
        session: String,
        #[arg(long)]
        json: bool,
    },
    Deactivate {
        #[arg(long)]
        test_case: Uuid,
    },
    /// List the built-in sample emails
    Samples,
    /// Check the legacy backend and provider credentials
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ab_evals=debug,sqlx=warn"
    } else {
        "ab_evals=info,sqlx=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Samples = cli.command {
        ui::TerminalUI::new().print_samples(samples::SAMPLES);
        return Ok(());
    }

    let store = open_store(&cli).await?;
    let service = build_service(&cli, store)?;

    let result = run(cli, &service).await;
    service.close().await;
    result
}

async fn open_store(cli: &Cli) -> Result<Arc<dyn EvaluationStore>> {
    let store: Arc<dyn EvaluationStore> = match cli.storage {
        StorageKind::Memory => Arc::new(MemoryStore::new()),
        StorageKind::Sqlite => Arc::new(
            SqliteStore::connect(&cli.database_url)
                .await
                .with_context(|| format!("Failed to open database '{}'", cli.database_url))?,
        ),
    };
    debug!(storage = ?cli.storage, "Opened evaluation store");
    Ok(store)
}

fn build_service(cli: &Cli, store: Arc<dyn EvaluationStore>) -> Result<EvaluationService> {
    let config = GeneratorConfig::default()
        .with_model_config(ModelConfig {
            provider: cli.provider.clone(),
            model: cli.model.clone(),
            ..Default::default()
        })
        .with_timeout(Duration::from_secs(cli.primary_timeout_secs));
    config.validate().map_err(|e| anyhow!(e))?;

    let model = match create_model(&cli.provider) {
        Ok(model) => Some(model),
        Err(e) => {
            warn!(
                provider = %cli.provider,
                error = %e,
                "Provider unavailable, comparisons will be simulated"
            );
            None
        }
    };

    let legacy: Option<Arc<dyn LegacyBackend>> = cli.legacy_url.as_ref().map(|url| {
        Arc::new(HttpLegacyBackend::new(url.clone(), cli.legacy_token.clone()))
            as Arc<dyn LegacyBackend>
    });

    let mut generator = ResponseGenerator::new(model, config);
    if let Some(legacy) = &legacy {
        generator = generator.with_legacy_backend(Arc::clone(legacy));
    }

    let mut service = EvaluationService::new(generator, store);
    if let Some(legacy) = legacy {
        service = service.with_legacy_backend(legacy);
    }
    Ok(service)
}

async fn run(cli: Cli, service: &EvaluationService) -> Result<()> {
    let ui = ui::TerminalUI::new();
    let primary_enabled = cli.provider_available();
    let header_config = ModelConfig {
        provider: cli.provider.clone(),
        model: cli.model.clone(),
        ..Default::default()
    };

    match cli.command {
        Commands::Compare {
            document,
            sample,
            user,
            category,
        } => {
            let request = match (document, sample) {
                (_, Some(id)) => {
                    let sample =
                        samples::find(id).ok_or_else(|| anyhow!("No sample email with id {id}"))?;
                    EvaluationRequest {
                        document: sample.document(),
                        user_id: Some(user),
                        case_name: Some(sample.subject.to_string()),
                        category: category.or_else(|| Some(sample.category.to_string())),
                    }
                }
                (Some(path), None) => EvaluationRequest {
                    document: read_document(&path).await?,
                    user_id: Some(user),
                    case_name: None,
                    category,
                },
                (None, None) => return Err(anyhow!("Either --document or --sample is required")),
            };

            ui.print_header(&header_config, primary_enabled);
            let spinner = ui.create_spinner("Generating responses...");
            let started = service.start_evaluation(request).await;
            spinner.finish_and_clear();
            ui.print_started(&started?);
        }
        Commands::Rate {
            session,
            user,
            score_a,
            score_b,
            comment_a,
            comment_b,
        } => {
            let (grade_1, grade_2) = service
                .record_comparison(
                    &session,
                    &user,
                    ComparisonRatings {
                        score_a,
                        score_b,
                        comment_a,
                        comment_b,
                    },
                )
                .await?;
            ui.print_comparison_recorded(&grade_1, &grade_2);
        }
        Commands::Grade {
            response,
            session,
            user,
            score,
            label,
            feedback,
        } => {
            let grade = service
                .record_grade(GradeRequest {
                    response_id: response,
                    grader_id: user,
                    score,
                    feedback,
                    session_id: session,
                    response_label: label,
                    comparison_winner: None,
                })
                .await?;
            ui.print_grade_recorded(&grade);
        }
        Commands::Stats { user, json } => {
            let stats = service.compute_stats(&user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui.print_stats(&user, &stats);
            }
        }
        Commands::Sessions { user, limit, json } => {
            let sessions = service.recent_sessions(&user, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else {
                ui.print_sessions(&sessions);
            }
        }
        Commands::Show { session, json } => {
            let session = service.get_session(&session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                ui.print_session(&session);
            }
        }
        Commands::Deactivate { test_case } => {
            let test_case = service.deactivate_test_case(test_case).await?;
            ui.print_deactivated(&test_case);
        }
        Commands::Health => {
            let legacy = service.legacy_reachable().await;
            ui.print_health(
                legacy,
                &[
                    ("OPENAI_API_KEY", env_present("OPENAI_API_KEY")),
                    ("ANTHROPIC_API_KEY", env_present("ANTHROPIC_API_KEY")),
                ],
            );
        }
        Commands::Samples => ui.print_samples(samples::SAMPLES),
    }

    Ok(())
}

impl Cli {
    fn provider_available(&self) -> bool {
        match self.provider.as_str() {
            "openai" => env_present("OPENAI_API_KEY"),
            "anthropic" => env_present("ANTHROPIC_API_KEY"),
            _ => false,
        }
    }
}

fn env_present(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| !value.is_empty())
}

async fn read_document(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut document = String::new();
        tokio::io::stdin()
            .read_to_string(&mut document)
            .await
            .context("Failed to read document from stdin")?;
        return Ok(document);
    }

    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read document '{}': {}", path.display(), e))
}
