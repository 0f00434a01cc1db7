use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use cms_studio::attachment::Attachment;
use cms_studio::backup::{create_backup, restore_backup};
use cms_studio::client::HttpDocumentClient;
use cms_studio::config::{AiConfig, ServerConfig};
use cms_studio::llm::AiGateway;
use cms_studio::prompts::PromptLibrary;
use cms_studio::sections::{SectionGenerator, SectionKind, publish};
use cms_studio::server::{AppState, routes};
use cms_studio::settings::SettingsStore;
use cms_studio::store::{DocumentStore, JsonFileStore};

#[derive(Parser, Debug)]
#[command(
    name = "cms-studio",
    version,
    about = "Content backend and AI section authoring",
    after_help = "Set CMS_BACKEND_URL to run backup/restore/generate against a remote backend."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the document backend (default)
    Serve {
        /// Port to listen on (overrides CMS_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write a backup bundle to FILE, or stdout
    Backup { file: Option<PathBuf> },
    /// Replace documents and settings from a backup bundle
    Restore { file: PathBuf },
    /// Generate a section and append it to a site
    Generate {
        site: String,
        /// hero, features or comparison
        kind: SectionKind,
        brief: String,
        /// Images or text files passed to the model
        attachments: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Warning: a rustls crypto provider was already installed");
    }

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    let _log_guard = init_tracing(config.log_dir.as_deref());

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Command::Backup { file } => backup(&config, file).await,
        Command::Restore { file } => restore(&config, &file).await,
        Command::Generate {
            site,
            kind,
            brief,
            attachments,
        } => generate(&config, &site, kind, &brief, &attachments).await,
    }
}

/// Log to stderr, or to a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cms-studio.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    eprintln!("CMS Studio v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data file: {}", config.data_file.display());
    eprintln!("   API: http://0.0.0.0:{}/api/data", config.port);
    eprintln!("   Changefeed: ws://0.0.0.0:{}/ws/data/{{path}}", config.port);
    if let Some(dir) = &config.log_dir {
        eprintln!("   Logs: {}", dir.display());
    }

    let store = Arc::new(JsonFileStore::new(config.data_file.clone()));
    // Fail fast on a corrupt data file rather than on the first request.
    let documents = store
        .dump()
        .await
        .with_context(|| format!("reading {}", config.data_file.display()))?
        .len();
    eprintln!("   Documents: {documents}\n");

    let app = routes(AppState::new(store, config.request_timeout));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "CMS backend started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// The store the CLI commands act on: the remote backend if configured,
/// otherwise the local data file.
fn document_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    Ok(match &config.backend_url {
        Some(url) => Arc::new(HttpDocumentClient::new(url)?),
        None => Arc::new(JsonFileStore::new(config.data_file.clone())),
    })
}

async fn backup(config: &ServerConfig, out: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = SettingsStore::open(config.settings_file.clone()).await?;
    let store = document_store(config)?;

    let bundle = create_backup(Value::Null, &settings, store.as_ref()).await?;
    let json = bundle.to_json_pretty()?;
    match out {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "Backed up {} documents to {}",
                bundle.backend_data.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn restore(config: &ServerConfig, file: &Path) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let settings = SettingsStore::open(config.settings_file.clone()).await?;
    let store = document_store(config)?;

    restore_backup(&json, &settings, store.as_ref()).await?;
    eprintln!("Restored {}", file.display());
    Ok(())
}

async fn generate(
    config: &ServerConfig,
    site: &str,
    kind: SectionKind,
    brief: &str,
    attachment_paths: &[PathBuf],
) -> anyhow::Result<()> {
    let mut attachments = Vec::with_capacity(attachment_paths.len());
    for path in attachment_paths {
        let attachment = Attachment::from_path(path)
            .await
            .with_context(|| format!("attaching {}", path.display()))?;
        attachments.push(attachment);
    }

    let settings = SettingsStore::open(config.settings_file.clone()).await?;
    let store = document_store(config)?;

    let ai_config = AiConfig::from_settings(&settings).await?;
    let gateway = Arc::new(AiGateway::new(&ai_config)?);
    let prompts = PromptLibrary::load(&settings, store.as_ref()).await;
    let generator = SectionGenerator::new(gateway, prompts);

    let section = generator.generate(kind, brief, attachments).await?;
    publish(store.as_ref(), site, section.clone()).await?;

    println!("{}", serde_json::to_string_pretty(&section)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["cms-studio"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn serve_port_override() {
        let cli = Cli::parse_from(["cms-studio", "serve", "--port", "8080"]);
        assert!(matches!(cli.command, Some(Command::Serve { port: Some(8080) })));
    }

    #[test]
    fn generate_parses_kind_and_attachments() {
        let cli = Cli::parse_from([
            "cms-studio",
            "generate",
            "quickstor",
            "feature-grid",
            "Fast NVMe storage",
            "specs.txt",
            "hero.png",
        ]);
        let Some(Command::Generate {
            site,
            kind,
            brief,
            attachments,
        }) = cli.command
        else {
            panic!("expected generate");
        };
        assert_eq!(site, "quickstor");
        assert_eq!(kind, SectionKind::Features);
        assert_eq!(brief, "Fast NVMe storage");
        assert_eq!(attachments, vec![PathBuf::from("specs.txt"), PathBuf::from("hero.png")]);
    }

    #[test]
    fn generate_requires_brief() {
        let err = Cli::try_parse_from(["cms-studio", "generate", "quickstor", "hero"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn unknown_section_kind_is_rejected() {
        let err = Cli::try_parse_from(["cms-studio", "generate", "quickstor", "pricing", "brief"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn restore_requires_file() {
        assert!(Cli::try_parse_from(["cms-studio", "restore"]).is_err());
    }
}
