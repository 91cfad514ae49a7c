//! dashexport command line
//!
//! ```bash
//! # Export the four default pages with the static backend
//! dashexport export --base-url http://localhost:8000
//!
//! # Export two pages through headless Chrome, two at a time
//! dashexport export --backend chrome --page /=Home --page /fte=FTE --concurrency 2
//!
//! # Ask the server to build the document instead
//! dashexport fetch-server-export --base-url http://localhost:8000
//!
//! # Leave a comment on a chart
//! dashexport comment --chart-id line-chart --page /fte --text "Check March"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dashexport::comments::{CommentClient, CommentDraft};
use dashexport::download::ServerExportClient;
use dashexport::{Error, ExportConfig, Exporter, FileDelivery, PageSpec, SessionProvider};
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dashexport")]
#[command(about = "Export InsightDash dashboard pages to a single PDF")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Headless Chrome over the DevTools Protocol
    Chrome,
    /// HTTP fetch and block painter, no JavaScript
    Static,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture dashboard pages and compose them into one document
    Export {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dashboard origin, overrides the configuration
        #[arg(long)]
        base_url: Option<String>,

        /// Page to export as PATH=TITLE; repeat to set the page list
        #[arg(long = "page", value_parser = parse_page)]
        pages: Vec<PageSpec>,

        #[arg(long, value_enum, default_value_t = Backend::Static)]
        backend: Backend,

        /// Pages captured at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Directory the document is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Download the document built by the dashboard server
    FetchServerExport {
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Post a comment on a chart
    Comment {
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,

        #[arg(long)]
        chart_id: String,

        #[arg(long, default_value = "/")]
        page: String,

        #[arg(long)]
        text: String,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        exclusion: Option<String>,

        #[arg(long)]
        why: Option<String>,

        #[arg(long)]
        quick_fix: Option<String>,

        #[arg(long)]
        to_do: Option<String>,
    },
}

fn parse_page(arg: &str) -> std::result::Result<PageSpec, String> {
    match arg.split_once('=') {
        Some((path, title)) if !path.is_empty() && !title.is_empty() => Ok(PageSpec::new(path, title)),
        _ => Err(format!("expected PATH=TITLE, got '{}'", arg)),
    }
}

async fn run_export<P: SessionProvider>(provider: P, config: ExportConfig, output_dir: PathBuf) -> Result<()> {
    let exporter = Exporter::new(provider, config)?;
    let mut sink = FileDelivery::new(output_dir);
    let pages = exporter.config().pages.clone();
    exporter.export(&pages, &mut sink).await?;
    if let Some(path) = sink.delivered() {
        println!("{}", path.display());
    }
    Ok(())
}

async fn export(
    config_path: Option<PathBuf>,
    base_url: Option<String>,
    pages: Vec<PageSpec>,
    backend: Backend,
    concurrency: Option<usize>,
    output_dir: PathBuf,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ExportConfig::from_json_file(&path)?,
        None => ExportConfig::default(),
    };
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if !pages.is_empty() {
        config.pages = pages;
    }
    if let Some(n) = concurrency {
        config.max_concurrent_captures = n;
    }
    info!(
        "Exporting {} page(s) from {} with the {:?} backend",
        config.pages.len(),
        config.base_url,
        backend
    );

    match backend {
        #[cfg(feature = "cdp")]
        Backend::Chrome => {
            let provider = dashexport::cdp::ChromeProvider::launch(&config).await?;
            run_export(provider, config, output_dir).await
        }
        #[cfg(feature = "static")]
        Backend::Static => {
            let provider = dashexport::static_html::StaticProvider::new(&config)?;
            run_export(provider, config, output_dir).await
        }
        #[allow(unreachable_patterns)]
        other => Err(Error::DependencyMissing(format!(
            "the {:?} backend is not compiled into this build",
            other
        ))
        .into()),
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Export {
            config,
            base_url,
            pages,
            backend,
            concurrency,
            output_dir,
        } => export(config, base_url, pages, backend, concurrency, output_dir).await,

        Commands::FetchServerExport { base_url, output_dir } => {
            let client = ServerExportClient::new(base_url);
            let mut sink = FileDelivery::new(output_dir);
            client.fetch_and_deliver(&mut sink).await?;
            if let Some(path) = sink.delivered() {
                println!("{}", path.display());
            }
            Ok(())
        }

        Commands::Comment {
            base_url,
            chart_id,
            page,
            text,
            user,
            reason,
            exclusion,
            why,
            quick_fix,
            to_do,
        } => {
            let draft = CommentDraft {
                chart_id,
                page,
                text,
                user,
                reason,
                exclusion,
                why,
                quick_fix,
                to_do,
            };
            let outcome = CommentClient::new(base_url)
                .submit(draft)
                .await
                .context("Failed to submit comment")?;
            println!("{} (id {})", outcome.receipt.message, outcome.receipt.id);
            for c in &outcome.comments {
                println!("[{}] {}: {}", c.id, c.user.as_deref().unwrap_or("Anonymous"), c.text);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
