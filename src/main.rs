use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mcpwatch::monitoring::report::format_trend;
use mcpwatch::monitoring::{sample_memory_trend, trend_duration, TrendSettings};
use mcpwatch::search::SearchEngine;
use mcpwatch::{
    demo, AppConfig, AppMonitor, ConfigLoader, DatabaseTools, McpServer, MongoConnector,
    MonitorTarget, MonitoringTools, SearchTools, StdioChannel, ToolProvider, WebSearchService,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// MCP demo servers and a stdio JSON-RPC client
///
/// `serve` hosts a server on stdin/stdout; the other commands launch servers
/// as child processes and talk to them.
#[derive(Parser, Debug)]
#[command(name = "mcpwatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log to file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Configuration file (skips the default lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host a server on stdin/stdout
    Serve {
        #[arg(value_enum)]
        server: ServerKind,
    },

    /// Launch a server and list its tools
    Tools { server: String },

    /// Launch a server and call one tool
    Call {
        server: String,
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Seconds to wait for the result (default: the configured request
        /// timeout, plus the sampling time for a memory trend)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_secs: Option<u64>,
    },

    /// Run the monitoring and search demos side by side
    Demo,

    /// Sample heap usage over time (Ctrl-C stops early)
    Trend {
        #[arg(long, default_value_t = 5.0)]
        duration_minutes: f64,

        #[arg(long, default_value_t = 30.0)]
        interval_seconds: f64,
    },

    /// Poll the monitored application's health endpoint until it answers
    WaitReady {
        #[arg(long, default_value_t = 30)]
        attempts: u32,

        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ServerKind {
    Monitoring,
    Search,
    Database,
}

fn setup_logging(log_level: &str, log_file: Option<PathBuf>) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // stdout carries the protocol when serving, so logs never go there.
    if let Some(log_path) = log_file {
        let file = std::fs::File::create(log_path)?;
        subscriber.with_ansi(false).with_writer(file).init();
    } else {
        subscriber.with_writer(std::io::stderr).init();
    }

    Ok(())
}

/// Cancelled on the first Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            trigger.cancel();
        }
    });
    token
}

async fn launch(config: &AppConfig, server: &str) -> Result<StdioChannel> {
    let command = config.server_command(server)?;
    let channel = StdioChannel::launch(server, command, config.channel_options())
        .await
        .with_context(|| format!("Failed to start server '{}'", server))?;
    Ok(channel)
}

async fn serve(config: &AppConfig, server: ServerKind, shutdown: CancellationToken) -> Result<()> {
    let provider: Arc<dyn ToolProvider> = match server {
        ServerKind::Monitoring => {
            let target = MonitorTarget::from_settings(&config.monitoring);
            info!("Monitoring target: {}", target);
            Arc::new(MonitoringTools::new(target)?)
        }
        ServerKind::Search => {
            let engine: SearchEngine = config
                .search
                .default_engine
                .parse()
                .map_err(anyhow::Error::msg)?;
            Arc::new(SearchTools::new(WebSearchService::new(engine)))
        }
        ServerKind::Database => {
            let timeout = Duration::from_secs(config.database.timeout_secs);
            info!("Database: '{}'", config.database.name);
            Arc::new(DatabaseTools::new(
                Arc::new(MongoConnector::new(timeout)),
                &config.database,
            ))
        }
    };

    McpServer::new(provider).with_shutdown(shutdown).run().await
}

async fn list_tools(config: &AppConfig, server: &str) -> Result<()> {
    let channel = launch(config, server).await?;
    let tools = channel.list_tools().await;
    channel.stop().await;

    for tool in tools? {
        println!("{}", tool.name);
        println!("    {}", tool.description);
        for (name, spec) in tool.parameters() {
            let required = if spec.required { " (required)" } else { "" };
            let default = spec
                .default
                .map(|value| format!(" [default: {}]", value))
                .unwrap_or_default();
            println!("    --{} <{}>{}{}", name, spec.kind, required, default);
        }
    }

    Ok(())
}

/// Configured request timeout, plus the sampling time of a memory trend.
fn call_deadline(config: &AppConfig, tool: &str, arguments: &Value) -> Duration {
    let request_timeout = config.channel_options().request_timeout;
    match tool {
        "monitor_memory_trend" => request_timeout + trend_duration(arguments).unwrap_or_default(),
        _ => request_timeout,
    }
}

async fn call_tool(
    config: &AppConfig,
    server: &str,
    tool: &str,
    args: &str,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let arguments: Value = serde_json::from_str(args).context("--args must be a JSON object")?;
    if !arguments.is_object() {
        bail!("--args must be a JSON object");
    }

    let deadline = match timeout_secs {
        Some(secs) => Duration::from_secs(secs),
        None => call_deadline(config, tool, &arguments),
    };

    let channel = launch(config, server).await?;
    let result = channel.call_tool_within(tool, arguments, deadline).await;
    channel.stop().await;

    let result = result?;
    println!("{}", result.joined_text());

    if result.is_error() {
        bail!("Tool '{}' reported an error", tool);
    }
    Ok(())
}

async fn run_demo(config: &AppConfig) -> Result<()> {
    let (monitoring, search) = tokio::try_join!(
        launch(config, "monitoring"),
        launch(config, "search")
    )?;

    let (monitoring_demo, search_demo) = tokio::join!(
        demo::run_monitoring_demo(&monitoring),
        demo::run_search_demo(&search)
    );

    tokio::join!(monitoring.stop(), search.stop());

    println!("== Monitoring ==\n{}", monitoring_demo?);
    println!("== Web search ==\n{}", search_demo?);
    Ok(())
}

async fn run_trend(
    config: &AppConfig,
    duration_minutes: f64,
    interval_seconds: f64,
    cancel: CancellationToken,
) -> Result<()> {
    let settings = TrendSettings::from_minutes_and_seconds(duration_minutes, interval_seconds)?;
    let monitor = AppMonitor::new(MonitorTarget::from_settings(&config.monitoring))?;

    info!(
        "Sampling {} every {:?} ({} samples)",
        monitor.target(),
        settings.interval(),
        settings.sample_count()
    );

    let trend = sample_memory_trend(&monitor, settings, &cancel).await;
    println!("{}", format_trend(&trend));
    Ok(())
}

async fn wait_ready(
    config: &AppConfig,
    attempts: u32,
    interval_ms: u64,
    cancel: CancellationToken,
) -> Result<()> {
    let monitor = AppMonitor::new(MonitorTarget::from_settings(&config.monitoring))?;

    match monitor
        .wait_until_ready(attempts, Duration::from_millis(interval_ms), &cancel)
        .await
    {
        Some(attempt) => {
            println!("{} is ready (attempt {})", monitor.target(), attempt);
            Ok(())
        }
        None => bail!(
            "{} did not become ready after {} attempt(s)",
            monitor.target(),
            attempts
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level, args.log_file)?;

    let loader = ConfigLoader::new(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(source) = loader.source() {
        info!("Configuration: {}", source.display());
    }
    let config = loader.into_config();

    let cancel = ctrl_c_token();

    match args.command {
        Command::Serve { server } => serve(&config, server, cancel).await,
        Command::Tools { server } => list_tools(&config, &server).await,
        Command::Call {
            server,
            tool,
            args,
            timeout_secs,
        } => call_tool(&config, &server, &tool, &args, timeout_secs).await,
        Command::Demo => run_demo(&config).await,
        Command::Trend {
            duration_minutes,
            interval_seconds,
        } => run_trend(&config, duration_minutes, interval_seconds, cancel).await,
        Command::WaitReady {
            attempts,
            interval_ms,
        } => wait_ready(&config, attempts, interval_ms, cancel).await,
    }
}
