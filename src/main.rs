use alarm_relay::{build_sender, Config, Dispatcher, EdsClient, Scheduler};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML); environment variables override it
    #[arg(short, long, env = "ALARM_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle, print its report and exit
    #[arg(long)]
    once: bool,

    /// Decide notifications without sending any SMS
    #[arg(long)]
    dry_run: bool,

    /// Do not start the web API
    #[arg(long)]
    no_web: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    alarm_relay::init_logging();

    info!("alarm-relay v{} starting", alarm_relay::VERSION);

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let config = Arc::new(config);
    info!(
        "Threshold {}, window {} min, {} contacts",
        config.alarms.priority_threshold,
        config.alarms.window_minutes,
        config.contacts.len()
    );

    let dispatcher = Arc::new(Dispatcher::new(config.settings()));
    let sources = EdsClient::factory(config.eds.clone());

    let sender = match build_sender(&config.sms) {
        Ok(sender) => Some(sender),
        Err(e) => {
            warn!("SMS gateway unavailable, notifications will not be sent: {}", e);
            None
        }
    };
    let cycle_sender = if args.dry_run { None } else { sender.clone() };

    let scheduler = Scheduler::new(
        dispatcher.clone(),
        sources.clone(),
        cycle_sender,
        config.poll_interval(),
    );

    if args.once {
        let Some(report) = scheduler.tick().await else {
            bail!("Alarm cycle could not run; check the EDS configuration");
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let scheduler_shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    }));

    #[cfg(feature = "web")]
    if config.web.enabled && !args.no_web {
        tasks.push(spawn_web(config.clone(), dispatcher, sources, sender, shutdown_rx)?);
    }

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }

    info!("alarm-relay stopped");
    Ok(())
}

#[cfg(feature = "web")]
fn spawn_web(
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    sources: alarm_relay::SourceFactory,
    sender: Option<Arc<dyn alarm_relay::SmsSender>>,
    shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    use alarm_relay::web;

    let addr = config.web_bind_address()?;
    let app = web::router(web::AppState::new(config, dispatcher, sources, sender));

    #[cfg(feature = "metrics")]
    let app = app.merge(alarm_relay::metrics::routes(
        alarm_relay::metrics::install_recorder()?,
    ));

    Ok(tokio::spawn(async move {
        if let Err(e) = web::serve(addr, app, shutdown).await {
            error!("Web API error: {}", e);
        }
    }))
}
