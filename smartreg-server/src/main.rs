use std::{net::SocketAddr, path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};

use smartreg_core::ConfigTemplate;
use smartreg_server::{
    AppState,
    cli::{RegisterArgs, run_register},
    create_app,
    infra::{
        config::{Config, ConfigLoad, ConfigLoader},
        logging,
    },
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "smartreg-server")]
#[command(
    about = "Registers network devices with a Smart Licensing server in batches"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SMARTREG_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Configuration template pushed to devices (overrides config)
    #[arg(long, env = "SMARTREG_TEMPLATE", global = true)]
    template: Option<PathBuf>,

    /// Maximum devices handled at once (overrides config)
    #[arg(long, env = "SMARTREG_MAX_WORKERS", global = true)]
    max_workers: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the web form (default)
    Serve,
    /// Register one batch of devices and print an outcome line per device
    Register(RegisterArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Register(args)) => run_batch(&cli.serve, args).await,
        Some(Command::Serve) | None => {
            run_server(cli.serve).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

struct Bootstrap {
    config: Config,
    template: ConfigTemplate,
}

async fn bootstrap(args: &ServeArgs) -> anyhow::Result<Bootstrap> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if let Some(template) = args.template.clone() {
        config.paths.template = template;
    }
    if let Some(max_workers) = args.max_workers {
        anyhow::ensure!(max_workers > 0, "--max-workers must be at least 1");
        config.registration.max_workers = max_workers;
    }

    logging::init(&config.logging)?;

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    let template = ConfigTemplate::load(&config.paths.template)
        .await
        .with_context(|| {
            format!(
                "failed to load configuration template {}",
                config.paths.template.display()
            )
        })?;
    info!(
        template = %config.paths.template.display(),
        lines = template.lines().len(),
        audit_dir = %config.paths.audit_dir.display(),
        max_workers = config.registration.max_workers,
        poll_timeout = %humantime::format_duration(config.registration.poll_timeout),
        "registration settings in effect"
    );

    Ok(Bootstrap { config, template })
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let Bootstrap { config, template } = bootstrap(&args).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let router = create_app(AppState::new(config, template));

    info!("Starting SmartReg server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn run_batch(
    serve: &ServeArgs,
    args: RegisterArgs,
) -> anyhow::Result<ExitCode> {
    let Bootstrap { config, template } = bootstrap(serve).await?;
    let state = AppState::new(config, template);
    let batch = args.into_batch().await?;

    let mut stdout = tokio::io::stdout();
    let summary = run_register(&state.orchestrator, batch, &mut stdout).await?;

    if summary.failed() > 0 {
        warn!(
            failed = summary.failed(),
            total = summary.total,
            "some devices were not registered"
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
