use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use inbox_sweep::auth::{CredentialStore, OAuthClient};
use inbox_sweep::config::AppConfig;
use inbox_sweep::gmail::{GmailClient, MailGateway};
use inbox_sweep::llm::create_provider;
use inbox_sweep::pipeline::Sweeper;
use inbox_sweep::pipeline::decision::ReplyDecisionEngine;
use inbox_sweep::pipeline::scheduler::{next_fire, spawn_sweep_scheduler};
use inbox_sweep::server::{AppState, sweep_report, sweep_routes};

enum Mode {
    /// Run one sweep, print the outcome, exit.
    Once(Option<i64>),
    /// Serve the HTTP trigger and/or the schedule.
    Serve,
}

fn parse_args() -> anyhow::Result<Mode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => Ok(Mode::Serve),
        [cmd] if cmd == "once" => Ok(Mode::Once(None)),
        [cmd, max] if cmd == "once" => {
            let max = max
                .parse()
                .with_context(|| format!("invalid max {max:?}, expected an integer"))?;
            Ok(Mode::Once(Some(max)))
        }
        _ => bail!("usage: inbox-sweep [once [max]]"),
    }
}

/// stderr always; a daily rolling file too when `SWEEP_LOG_DIR` is set.
fn init_tracing(config: &AppConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match &config.sweep.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-sweep.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let mode = parse_args()?;
    let config = AppConfig::from_env().context("loading configuration")?;
    let _log_guard = init_tracing(&config);

    eprintln!("📬 Inbox Sweep v{}", env!("CARGO_PKG_VERSION"));

    // ── Credentials + mailbox ───────────────────────────────────────────
    let credentials = Arc::new(CredentialStore::with_refresh_token(
        config.google.refresh_token.clone(),
    ));
    if !credentials.is_configured().await {
        tracing::warn!("GOOGLE_REFRESH_TOKEN not set, sweeps will fail until it is supplied");
    }
    let oauth = OAuthClient::with_token_url(
        config.google.client_id.clone(),
        config.google.client_secret.clone(),
        &config.google.token_url,
    );
    let gateway: Arc<dyn MailGateway> = Arc::new(GmailClient::with_base_url(
        Arc::clone(&credentials),
        oauth,
        &config.google.api_base,
    ));

    // ── Decision engine ─────────────────────────────────────────────────
    let llm = match &config.llm {
        Some(llm_config) => Some(create_provider(llm_config)?),
        None => {
            tracing::warn!("No OPENAI_API_KEY or ANTHROPIC_API_KEY, sweeps will fail");
            None
        }
    };
    let decision = ReplyDecisionEngine::new(llm, config.sweep.signature.clone());

    let sweeper = Arc::new(
        Sweeper::new(credentials, gateway, decision)
            .with_body_excerpts(config.sweep.include_body)
            .with_sender(config.sweep.sender.clone()),
    );

    match mode {
        Mode::Once(max) => {
            Ok(run_once(&sweeper, max.unwrap_or(config.sweep.default_max_results)).await)
        }
        Mode::Serve => serve(config, sweeper).await.map(|()| ExitCode::SUCCESS),
    }
}

/// Print the sweep outcome as JSON on stdout. Failure maps to a non-zero
/// exit code, returned so the log guard still flushes.
async fn run_once(sweeper: &Sweeper, max: i64) -> ExitCode {
    let result = sweeper.run_sweep(max).await;
    if let Err(e) = &result {
        tracing::warn!(code = e.code(), error = %e, "Sweep failed");
    }
    let (status, body) = sweep_report(&result);
    println!("{body:#}");
    if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn serve(config: AppConfig, sweeper: Arc<Sweeper>) -> anyhow::Result<()> {
    let AppConfig { sweep, .. } = config;
    if sweep.trigger_secret.is_none() && sweep.schedule.is_none() {
        bail!(
            "nothing to serve: set SWEEP_TRIGGER_SECRET and/or SWEEP_SCHEDULE, \
             or run `inbox-sweep once`"
        );
    }

    // ── Schedule ────────────────────────────────────────────────────────
    let _scheduler = match sweep.schedule {
        Some(schedule) => {
            match next_fire(&schedule) {
                Some(next) => eprintln!("   Schedule: enabled (next run {next})"),
                None => eprintln!("   Schedule: enabled (no upcoming runs)"),
            }
            Some(spawn_sweep_scheduler(
                Arc::clone(&sweeper),
                schedule,
                sweep.default_max_results,
            ))
        }
        None => {
            eprintln!("   Schedule: disabled");
            None
        }
    };

    // ── HTTP trigger ────────────────────────────────────────────────────
    let Some(trigger_secret) = sweep.trigger_secret else {
        eprintln!("   HTTP trigger: disabled\n");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        return Ok(());
    };

    let app = sweep_routes(AppState {
        sweeper,
        trigger_secret,
        default_max: sweep.default_max_results,
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", sweep.port))
        .await
        .with_context(|| format!("binding port {}", sweep.port))?;
    eprintln!("   HTTP trigger: http://0.0.0.0:{}/api/sweep\n", sweep.port);
    tracing::info!(port = sweep.port, "Sweep trigger server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
