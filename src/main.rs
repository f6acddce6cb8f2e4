use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;

use bidhouse::ban::BanEngine;
use bidhouse::bidding::{AntiSnipePolicy, BidResolver};
use bidhouse::configure::load_config;
use bidhouse::fanout::{Notifier, PushGateway, Relay, UpdatePublisher};
use bidhouse::gateway::{create_app, AppState};
use bidhouse::ledger::AuctionLedger;
use bidhouse::logger::setup_logger;
use bidhouse::payment::PaymentGateway;
use bidhouse::questions::QuestionDesk;
use bidhouse::scheduler::run_close_scan;
use bidhouse::settlement::SettlementEngine;

#[derive(Parser, Debug)]
#[command(about = "Auction settlement service")]
struct Args {
    /// Override the configured listen address
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config().context("failed to load config")?;
    setup_logger(&config).map_err(|e| anyhow::anyhow!("failed to set up logging: {}", e))?;

    let ledger = Arc::new(AuctionLedger::new(config.machine_id));
    let updates = UpdatePublisher::new(config.update_channel_capacity);
    let (notifier, mut notification_rx) = Notifier::channel();
    let relay = Arc::new(Relay::new());
    let policy =
        AntiSnipePolicy::from_secs(config.anti_snipe_window_secs, config.anti_snipe_extend_secs);

    let resolver = BidResolver::new(ledger.clone(), updates.clone(), notifier.clone(), policy);
    let state = Arc::new(AppState {
        ledger: ledger.clone(),
        resolver: resolver.clone(),
        bans: BanEngine::new(ledger.clone(), updates.clone(), notifier.clone()),
        settlement: SettlementEngine::new(ledger.clone()),
        payment: PaymentGateway::new(
            config.payment_secret.clone(),
            config.payment_tmn_code.clone(),
            config.payment_gateway_url.clone(),
            config.payment_return_url.clone(),
        ),
        questions: QuestionDesk::new(ledger.clone(), notifier.clone()),
        relay: relay.clone(),
        notifier: notifier.clone(),
    });

    // Relay feeding the websocket subscribers
    let relay_rx = updates.subscribe();
    tokio::spawn(async move { relay.run(relay_rx).await });

    // Optional bridge to an external push server
    if !config.push_api_url.is_empty() {
        let push = PushGateway::new(config.push_api_url.clone(), config.push_api_key.clone());
        let push_rx = updates.subscribe();
        tokio::spawn(async move { push.run(push_rx).await });
    }

    // Notification stream drain; a delivery worker would sit here
    tokio::spawn(async move {
        while let Some(event) = notification_rx.recv().await {
            info!("Notification ready for delivery: {}", event.kind());
        }
    });

    tokio::spawn(run_close_scan(
        resolver,
        ledger,
        Duration::from_secs(config.close_scan_secs),
    ));

    let addr = args.listen.unwrap_or(config.listen_addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Auction settlement service listening on {}", addr);
    axum::serve(listener, create_app(state))
        .await
        .context("server error")?;

    Ok(())
}
