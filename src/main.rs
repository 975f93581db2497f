use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use assetdesk::gate::{AccessGate, RouteDecision};
use assetdesk::notifications::{DesktopNotifier, NoticeKind, Notifier, ToastQueue};
use assetdesk::payment::{HttpBackend, QuotaAlert, SubscriptionStore};
use assetdesk::session::{JsonFileSession, SessionStorage, ORGANIZATION_ID_KEY};
use assetdesk::ClientConfig;

#[derive(Parser)]
#[command(name = "assetdesk")]
#[command(about = "Inspect and manage the AssetDesk subscription for an organization")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Organization id to store in the session
    #[arg(long, global = true)]
    org: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the plan, limits and gate state
    Status,
    /// Check whether one more resource may be created
    Check { resource: String },
    /// Show what the dashboard would do for a route
    Route { path: String },
    /// Re-fetch the snapshot without a loading state
    Refresh,
    /// Activate the free trial
    StartTrial,
    /// Hide the free-trial prompt for the rest of the session
    DismissTrial,
    /// Open the subscription page in the browser
    Subscribe,
    /// End the session, forgetting the organization and trial prompt
    EndSession,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("assetdesk=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    debug!("Using backend {}", config.backend_url);

    let session = Arc::new(JsonFileSession::open(ClientConfig::session_path()));
    if let Some(org) = cli.org.clone().or_else(|| config.organization_id.clone()) {
        session
            .set(ORGANIZATION_ID_KEY, &org)
            .context("Failed to store organization in session")?;
    }

    if let Commands::EndSession = cli.command {
        session.clear().context("Failed to clear session")?;
        info!("Session cleared");
        println!("Session ended");
        return Ok(ExitCode::SUCCESS);
    }

    if let Commands::Subscribe = cli.command {
        let url = config.page_url(&config.subscribe_path)?;
        println!("Opening {}", url);
        if let Err(e) = webbrowser::open(url.as_str()) {
            warn!("Failed to open browser: {}", e);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let toasts = Arc::new(ToastQueue::new());
    let notifier: Arc<dyn Notifier> = if config.desktop_notifications {
        Arc::new(DesktopNotifier::new())
    } else {
        toasts.clone()
    };

    let backend = HttpBackend::from_config(&config).context("Failed to create HTTP client")?;
    let store = SubscriptionStore::new(Arc::new(backend), session.clone(), notifier);
    let gate = AccessGate::from_config(&config);

    let code = match cli.command {
        Commands::Status => {
            store.mount().await;
            print_status(&store, &gate).await;
            ExitCode::SUCCESS
        }
        Commands::Check { resource } => {
            store.mount().await;
            let decision = store.limit_decision(&resource).await;
            if store.check_limit(&resource).await {
                println!("{}: allowed", resource);
                if let Some(warning) = decision.get_message() {
                    println!("  {}", warning);
                }
                ExitCode::SUCCESS
            } else {
                println!("{}: blocked", resource);
                ExitCode::from(2)
            }
        }
        Commands::Route { path } => {
            store.mount().await;
            let view = gate.view(&store, &path).await;
            println!("gate: {}", view.state);
            match &view.decision {
                RouteDecision::Render => println!("{}: render", path),
                RouteDecision::ShowLoading => println!("{}: loading", path),
                RouteDecision::Redirect { path: target, .. } => {
                    println!("{}: redirect to {}", path, target)
                }
            }
            if view.show_trial_modal {
                println!("free trial prompt: visible");
            }
            ExitCode::SUCCESS
        }
        Commands::Refresh => {
            store.refresh_after_mutation().await;
            print_status(&store, &gate).await;
            ExitCode::SUCCESS
        }
        Commands::StartTrial => {
            store.mount().await;
            if store.start_trial().await {
                print_status(&store, &gate).await;
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::DismissTrial => {
            store.dismiss_trial_modal().await;
            println!("Free trial prompt dismissed for this session");
            ExitCode::SUCCESS
        }
        Commands::Subscribe | Commands::EndSession => ExitCode::SUCCESS,
    };

    for notice in toasts.drain() {
        let marker = match notice.kind {
            NoticeKind::Blocking => "!",
            NoticeKind::Transient => "-",
        };
        eprintln!("{} [{:?}] {}: {}", marker, notice.level, notice.title, notice.message);
    }

    Ok(code)
}

async fn print_status(store: &SubscriptionStore, gate: &AccessGate) {
    let state = store.state().await;
    let Some(snapshot) = state.snapshot.as_ref() else {
        println!("No subscription data loaded");
        return;
    };

    match &snapshot.subscription {
        Some(subscription) => {
            let plan = subscription.plan_name.as_deref().unwrap_or("unnamed plan");
            let trial = if subscription.is_trialing() { " (trial)" } else { "" };
            println!("Plan: {}{}", plan, trial);
            if let Some(days) = subscription.days_remaining() {
                println!("Days remaining: {}", days);
            }
            if subscription.needs_payment_update() {
                println!("Payment method needs attention");
            }
        }
        None => println!("Plan: none (subscribe at {})", gate.subscribe_path()),
    }

    for name in snapshot.resource_names() {
        let Some(info) = snapshot.limit_for(name) else {
            continue;
        };
        let limit = info
            .limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        let alert = match QuotaAlert::from_limit(info) {
            QuotaAlert::None => String::new(),
            QuotaAlert::Approaching(pct) => format!(" ({}% used)", pct),
            QuotaAlert::Exceeded => " (limit reached)".to_string(),
        };
        let allowed = if info.allowed { "yes" } else { "no" };
        println!("  {:<10} {}/{}  can add: {}{}", name, info.current, limit, allowed, alert);
    }

    println!("Gate: {}", assetdesk::GateState::from_store(&state));
    if state.trial_modal.shown {
        println!("Free trial available: run `assetdesk start-trial`");
    }
}
