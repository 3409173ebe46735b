//! Guardian - Prop-Firm Compliance Monitor
//!
//! Watches funded trading accounts against their firm's rules and raises
//! warnings before limits are hit and hard-breach alerts when they are.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use guardian::adapters::{CtraderClient, Mt5Client, SqliteRuleStore, TerminalSink};
use guardian::api::{build_router, AppState};
use guardian::application::{
    Dispatcher, PlatformFactory, RuleResolver, Supervisor, DEFAULT_DISPATCH_BUFFER,
};
use guardian::config::{
    account_from_env, load_accounts, rules_db_path_from_env, AccountConfig, ConfigError,
    CtraderCredentials, Mt5Credentials,
};
use guardian::domain::presets::PresetRegistry;
use guardian::domain::snapshot::Platform;
use guardian::domain::taxonomy::ProgramTaxonomy;
use guardian::ports::platform::PlatformPort;
use guardian::ports::rule_store::RuleStorePort;

/// Guardian - compliance monitor for prop-firm trading accounts
#[derive(Parser, Debug)]
#[command(
    name = "guardian",
    version = env!("CARGO_PKG_VERSION"),
    about = "Real-time compliance monitor for prop-firm trading accounts",
    long_about = "Guardian continuously reads account state from MetaTrader 5 or cTrader, \
                  evaluates the applicable prop-firm rules on every observation, and emits \
                  warnings before limits are reached and hard-breach alerts when they are."
)]
struct CliApp {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the supervisor over the configured account set
    Monitor(MonitorCmd),

    /// Serve the HTTP compliance review API
    Review(ReviewCmd),

    /// Inspect resolved rules
    Rules(RulesCmd),
}

#[derive(Parser, Debug)]
struct MonitorCmd {
    /// Path to the accounts configuration file
    #[arg(short, long, value_name = "FILE", default_value = "accounts.json")]
    config: PathBuf,

    /// Also serve GET /health with per-account status on this address
    #[arg(long, value_name = "ADDR")]
    health: Option<String>,
}

#[derive(Parser, Debug)]
struct ReviewCmd {
    /// Listen address for the review API
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8010")]
    bind: String,

    /// SQLite rules database (overrides GUARDIAN_RULES_DB)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,
}

#[derive(Parser, Debug)]
struct RulesCmd {
    #[command(subcommand)]
    command: RulesSubcommand,
}

#[derive(Subcommand, Debug)]
enum RulesSubcommand {
    /// Print the resolved rules and their source for a firm/program
    Show(RulesShowCmd),
}

#[derive(Parser, Debug)]
struct RulesShowCmd {
    /// Firm name (preset name or alias also accepted)
    #[arg(long)]
    firm: String,

    /// Program identifier or any known alias
    #[arg(long)]
    program: Option<String>,

    /// SQLite rules database (overrides GUARDIAN_RULES_DB)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,

    /// Emit JSON instead of the table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    // Secrets come from the environment; a local .env is honored.
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug);

    let result = match app.command {
        Command::Monitor(cmd) => monitor_command(cmd).await,
        Command::Review(cmd) => review_command(cmd).await,
        Command::Rules(cmd) => match cmd.command {
            RulesSubcommand::Show(cmd) => rules_show_command(cmd).await,
        },
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{e:#}");
            if e.downcast_ref::<ConfigError>().is_some() {
                1
            } else {
                2
            }
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Open the rule store when a path is configured. A broken store is a
/// warning, not a startup failure: the preset and custom tiers still work.
async fn open_store(explicit: Option<String>) -> Option<Arc<dyn RuleStorePort>> {
    let path = explicit.or_else(rules_db_path_from_env)?;
    match SqliteRuleStore::connect(&path).await {
        Ok(store) => {
            tracing::info!(path = %path, "rule store attached");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "rule store unavailable; db tier disabled");
            None
        }
    }
}

fn build_resolver(store: Option<Arc<dyn RuleStorePort>>) -> RuleResolver {
    RuleResolver::new(
        store,
        Arc::new(PresetRegistry::builtin()),
        Arc::new(ProgramTaxonomy::builtin()),
    )
}

async fn monitor_command(cmd: MonitorCmd) -> Result<()> {
    let accounts = load_account_set(&cmd.config)?;
    tracing::info!(accounts = accounts.len(), "account set loaded");

    // Credentials are validated up front for every platform in use, so a
    // typo'd .env fails fast with a config error instead of a retry loop.
    let needs_mt5 = accounts.iter().any(|a| a.enabled && a.platform == Platform::Mt5);
    let needs_ctrader = accounts.iter().any(|a| a.enabled && a.platform == Platform::Ctrader);
    let mt5_credentials = if needs_mt5 {
        Some(Mt5Credentials::from_env()?)
    } else {
        None
    };
    let ctrader_credentials = if needs_ctrader {
        Some(CtraderCredentials::from_env()?)
    } else {
        None
    };

    let store = open_store(None).await;
    let resolver = build_resolver(store.clone());

    let dispatcher = Dispatcher::new(DEFAULT_DISPATCH_BUFFER);
    dispatcher.register(Arc::new(TerminalSink::new()));

    let factory: PlatformFactory = Arc::new(move |account: &AccountConfig| {
        let platform: Box<dyn PlatformPort> = match account.platform {
            Platform::Mt5 => {
                let credentials = mt5_credentials
                    .clone()
                    .expect("mt5 credentials checked at startup");
                Box::new(Mt5Client::new(credentials, &account.account_id)?)
            }
            Platform::Ctrader => {
                let credentials = ctrader_credentials
                    .clone()
                    .expect("ctrader credentials checked at startup");
                Box::new(CtraderClient::new(credentials, &account.account_id)?)
            }
        };
        Ok(platform)
    });

    let supervisor = Supervisor::start(accounts, &resolver, factory, dispatcher).await;
    if supervisor.monitor_count() == 0 {
        bail!("no account could be monitored; see the errors above");
    }

    // Combined mode: expose supervisor status over GET /health.
    if let Some(addr) = cmd.health {
        let state = Arc::new(AppState {
            resolver: resolver.clone(),
            store,
            status_view: supervisor.status_view(),
        });
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding health endpoint on {addr}"))?;
        tracing::info!(%addr, "health endpoint listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, build_router(state)).await {
                tracing::error!(error = %e, "health endpoint stopped");
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    supervisor.shutdown().await;
    Ok(())
}

/// Accounts come from the file when it exists, otherwise from the
/// single-account environment form.
fn load_account_set(path: &PathBuf) -> Result<Vec<AccountConfig>> {
    if path.exists() {
        return Ok(load_accounts(path)?);
    }
    if let Some(account) = account_from_env()? {
        tracing::info!(account = %account.label, "using single-account environment configuration");
        return Ok(vec![account]);
    }
    Err(ConfigError::Validation(format!(
        "no accounts file at '{}' and no GUARDIAN_ACCOUNT_ID in the environment",
        path.display()
    ))
    .into())
}

async fn review_command(cmd: ReviewCmd) -> Result<()> {
    let store = open_store(cmd.db).await;
    let state = Arc::new(AppState {
        resolver: build_resolver(store.clone()),
        store,
        status_view: Default::default(),
    });

    let listener = tokio::net::TcpListener::bind(&cmd.bind)
        .await
        .with_context(|| format!("binding review API on {}", cmd.bind))?;
    tracing::info!(addr = %cmd.bind, "review API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await
        .context("review API server failed")?;
    Ok(())
}

async fn rules_show_command(cmd: RulesShowCmd) -> Result<()> {
    let store = open_store(cmd.db).await;
    let resolver = build_resolver(store);

    let resolved = resolver
        .resolve(&cmd.firm, cmd.program.as_deref(), None)
        .await
        .with_context(|| format!("resolving rules for '{}'", cmd.firm))?;

    if cmd.json {
        let out = serde_json::json!({
            "rules": resolved.rules,
            "source": resolved.source,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let rules = &resolved.rules;
    println!("Rules: {} (source: {})", rules.name, resolved.source);
    println!("  Program:           {}", rules.program_id.as_deref().unwrap_or("-"));
    println!("  Daily drawdown:    {}%", rules.max_daily_drawdown_pct);
    println!("  Total drawdown:    {}%", rules.max_total_drawdown_pct);
    println!("  Risk per trade:    {}%", rules.max_risk_per_trade_pct);
    println!("  Max open lots:     {}", rules.max_open_lots);
    println!("  Max positions:     {}", rules.max_positions);
    println!(
        "  Margin warn/crit:  {}% / {}%",
        rules.margin_warn_level_pct, rules.margin_critical_level_pct
    );
    println!("  Trading days only: {}", rules.trading_days_only);
    println!("  Require stop loss: {}", rules.require_stop_loss);
    match rules.max_leverage {
        Some(lev) => println!("  Max leverage:      1:{lev:.0}"),
        None => println!("  Max leverage:      -"),
    }
    println!("  Warn buffer:       {}", rules.warn_buffer_pct);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_monitor_defaults() {
        let app = CliApp::try_parse_from(["guardian", "monitor"]).unwrap();
        match app.command {
            Command::Monitor(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("accounts.json"));
                assert!(cmd.health.is_none());
            }
            _ => panic!("Expected Monitor command"),
        }
    }

    #[test]
    fn parse_monitor_with_health_endpoint() {
        let app =
            CliApp::try_parse_from(["guardian", "monitor", "--health", "127.0.0.1:8070"]).unwrap();
        match app.command {
            Command::Monitor(cmd) => {
                assert_eq!(cmd.health.as_deref(), Some("127.0.0.1:8070"));
            }
            _ => panic!("Expected Monitor command"),
        }
    }

    #[test]
    fn parse_review_defaults() {
        let app = CliApp::try_parse_from(["guardian", "review"]).unwrap();
        match app.command {
            Command::Review(cmd) => {
                assert_eq!(cmd.bind, "127.0.0.1:8010");
                assert!(cmd.db.is_none());
            }
            _ => panic!("Expected Review command"),
        }
    }

    #[test]
    fn parse_rules_show() {
        let app = CliApp::try_parse_from([
            "guardian", "rules", "show", "--firm", "FundedNext", "--program", "stellar_1step",
            "--json",
        ])
        .unwrap();
        match app.command {
            Command::Rules(cmd) => match cmd.command {
                RulesSubcommand::Show(show) => {
                    assert_eq!(show.firm, "FundedNext");
                    assert_eq!(show.program.as_deref(), Some("stellar_1step"));
                    assert!(show.json);
                }
            },
            _ => panic!("Expected Rules command"),
        }
    }

    #[test]
    fn rules_show_requires_firm() {
        assert!(CliApp::try_parse_from(["guardian", "rules", "show"]).is_err());
    }

    #[test]
    fn global_flags_parse_anywhere() {
        let app = CliApp::try_parse_from(["guardian", "-v", "--debug", "review"]).unwrap();
        assert!(app.verbose);
        assert!(app.debug);
    }
}
