//! KeyRelay - serve key-press commands over HTTP.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use keyrelay::{
    ActionExecutor, Dispatcher, DryRunExecutor, Monitor, ProcessExecutor, RelayConfig, RelayServer,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keyrelay")]
#[command(about = "Rate-limited HTTP relay that turns commands into host key presses")]
#[command(version)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "KEYRELAY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "KEYRELAY_PORT", default_value_t = 5000)]
    port: u16,

    /// HTTP handler threads
    #[arg(long, env = "KEYRELAY_HTTP_THREADS", default_value_t = 8)]
    http_threads: usize,

    /// Fallback worker threads
    #[arg(short, long, env = "KEYRELAY_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Overflow queue capacity
    #[arg(long, env = "KEYRELAY_QUEUE_CAPACITY", default_value_t = 20)]
    queue_capacity: usize,

    /// Minimum gap between accepted actions, in milliseconds
    #[arg(long, env = "KEYRELAY_MIN_INTERVAL_MS", default_value_t = 20)]
    min_interval_ms: u64,

    /// Requests allowed per second
    #[arg(long, env = "KEYRELAY_MAX_RPS", default_value_t = 40)]
    max_rps: usize,

    /// Window size above which a flood is declared
    #[arg(long, env = "KEYRELAY_FLOOD_THRESHOLD", default_value_t = 35)]
    flood_threshold: usize,

    /// Timestamps kept by the sliding window
    #[arg(long, env = "KEYRELAY_WINDOW_CAPACITY", default_value_t = 50)]
    window_capacity: usize,

    /// Seconds between stats reports
    #[arg(long, env = "KEYRELAY_MONITOR_INTERVAL_SECS", default_value_t = 30)]
    monitor_interval_secs: u64,

    /// Deadline for one key injection, in milliseconds
    #[arg(long, env = "KEYRELAY_ACTION_TIMEOUT_MS", default_value_t = 250)]
    action_timeout_ms: u64,

    /// Key injection program
    #[arg(long, env = "KEYRELAY_KEY_PROGRAM", default_value = "xdotool")]
    key_program: String,

    /// Arguments placed before the key name (comma separated)
    #[arg(long, env = "KEYRELAY_KEY_ARGS", value_delimiter = ',', default_value = "key")]
    key_args: Vec<String>,

    /// Key sent for the primary command
    #[arg(long, env = "KEYRELAY_PRIMARY_KEY", default_value = "space")]
    primary_key: String,

    /// Key sent for the secondary command
    #[arg(long, env = "KEYRELAY_SECONDARY_KEY", default_value = "Down")]
    secondary_key: String,

    /// Log actions instead of injecting keys
    #[arg(long, env = "KEYRELAY_DRY_RUN")]
    dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_min_interval(Duration::from_millis(self.min_interval_ms))
            .with_rate_limit(self.max_rps, self.flood_threshold)
            .with_window_capacity(self.window_capacity)
            .with_queue_capacity(self.queue_capacity)
            .with_workers(self.workers)
    }

    fn executor(&self) -> Arc<dyn ActionExecutor> {
        if self.dry_run {
            return Arc::new(DryRunExecutor);
        }
        Arc::new(
            ProcessExecutor::new(
                self.key_program.clone(),
                self.key_args.clone(),
                self.primary_key.clone(),
                self.secondary_key.clone(),
            )
            .with_timeout(Duration::from_millis(self.action_timeout_ms)),
        )
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_thread_names(true)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("failed to register handler for signal {}", signal))?;
    }

    let dispatcher = Arc::new(
        Dispatcher::new(cli.relay_config(), cli.executor()).context("invalid relay configuration")?,
    );
    dispatcher.start().context("failed to start worker pool")?;

    let monitor = Monitor::start(
        dispatcher.clone(),
        Duration::from_secs(cli.monitor_interval_secs.max(1)),
    )
    .context("failed to start monitor")?;

    let addr = format!("{}:{}", cli.host, cli.port);
    let server = RelayServer::bind(&addr, dispatcher.clone(), shutdown.clone())
        .with_context(|| format!("failed to start HTTP server on {}", addr))?;

    if cli.dry_run {
        info!("Dry-run mode: key presses are logged, not injected");
    } else {
        info!(
            "Injecting keys with `{} {}` (primary: {}, secondary: {})",
            cli.key_program,
            cli.key_args.join(" "),
            cli.primary_key,
            cli.secondary_key
        );
    }

    let served = server.run(cli.http_threads);

    info!("Shutting down");
    monitor.stop();
    dispatcher.shutdown();
    keyrelay::report(&dispatcher);

    served.context("HTTP server failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_library_defaults() {
        let cli = Cli::parse_from(["keyrelay"]);
        let config = cli.relay_config();
        let defaults = RelayConfig::default();

        assert_eq!(config.min_interval, defaults.min_interval);
        assert_eq!(config.max_requests_per_second, defaults.max_requests_per_second);
        assert_eq!(config.flood_threshold, defaults.flood_threshold);
        assert_eq!(config.window_capacity, defaults.window_capacity);
        assert_eq!(config.queue_capacity, defaults.queue_capacity);
        assert_eq!(config.workers, defaults.workers);
        assert_eq!(cli.key_args, vec!["key".to_string()]);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "keyrelay",
            "--port",
            "8080",
            "--workers",
            "2",
            "--min-interval-ms",
            "50",
            "--key-args",
            "key,--clearmodifiers",
            "--dry-run",
            "-vv",
        ]);

        assert_eq!(cli.port, 8080);
        assert_eq!(cli.relay_config().workers, 2);
        assert_eq!(cli.relay_config().min_interval, Duration::from_millis(50));
        assert_eq!(cli.key_args, vec!["key", "--clearmodifiers"]);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
    }
}
