//! logroute - per-application, per-severity log routing demo
//!
//! Loads the layered settings, configures every listed application, emits a
//! round of sample events for each and prints the resulting metrics report.

use anyhow::{Context, Result};
use clap::Parser;
use logroute::{cli::Cli, config::Settings, core::Severity, LogRouter};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let settings = match Settings::load(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            // Manually initialize logging for this specific error
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("logroute starting up...");

    // Log the loaded configuration settings for visibility
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", settings.log_level);
    info!("Default Log Path: {}", settings.defaults.effective_log_path().display());
    info!("Default Max File Size: {}", settings.defaults.effective_max_file_size());
    info!("Default Total Size Cap: {}", settings.defaults.effective_total_size_cap());
    info!("Default Pattern: {}", settings.defaults.effective_pattern());
    if settings.applications.is_empty() {
        info!("Applications: none configured, using \"demo\"");
    }
    for (app, config) in &settings.applications {
        info!(
            "Application {}: path={}, alerting={}",
            app,
            config.effective_log_path().display(),
            if config.alert.enabled { "Enabled" } else { "Disabled" }
        );
    }
    info!("Sample Rounds: {}", cli.events);
    info!("-------------------------------------------------------");

    let router = LogRouter::from_settings(&settings)?;

    let apps: Vec<String> = if settings.applications.is_empty() {
        vec!["demo".to_string()]
    } else {
        settings.applications.keys().cloned().collect()
    };

    for app in &apps {
        let logger = router.logger(app)?;
        for round in 0..cli.events {
            for severity in Severity::ALL {
                logger.log(severity, format!("sample {} event #{}", severity, round + 1), false);
            }
            logger.error_with_alert(format!("sample escalated event #{}", round + 1));
        }
        info!(app = %app, rounds = cli.events, "Emitted sample events");
    }

    router.flush();

    let report = router
        .metrics()
        .report()
        .to_json_pretty()
        .context("failed to serialize metrics report")?;
    println!("{report}");

    router.shutdown();
    info!("All sinks closed. Exiting.");

    Ok(())
}
