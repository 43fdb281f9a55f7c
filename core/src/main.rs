use issuance_core::config::{load_config, AppConfig};
use issuance_core::{
    api, Connector, Controller, PurchaseFlow, PurchaseTrigger, RpcWallet, WalletBackend,
};
use std::env;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn build_controller(config: &AppConfig) -> Result<Controller, Box<dyn std::error::Error>> {
    let network = config.network()?;
    let settings = config.purchase_settings()?;
    tracing::info!(
        network = %network.name,
        chain_id = network.chain_id,
        token = ?settings.token_address,
        stable = ?settings.stable_address,
        policy = ?settings.allowance_policy,
        "Purchase settings resolved"
    );

    let backends: Vec<Arc<dyn WalletBackend>> = config
        .wallet_endpoints()
        .into_iter()
        .map(|endpoint| {
            tracing::debug!(wallet = %endpoint.name, url = %endpoint.url, "Wallet backend configured");
            Arc::new(RpcWallet::new(endpoint).with_timeout(config.rpc_timeout())) as Arc<dyn WalletBackend>
        })
        .collect();
    let connector = Connector::new(backends);
    if connector.is_empty() {
        tracing::warn!("No wallet endpoints configured; connect will always fail");
    } else {
        tracing::info!(order = ?connector.backend_names(), "Wallet backends configured");
    }

    let flow = PurchaseFlow::new(settings)?;
    Ok(Controller::new(
        connector,
        flow,
        config.token_decimals,
        config.swap_widget,
    ))
}

/// `issuance buy <amount>`: connect, purchase once, report.
async fn buy_once(controller: &Controller, amount: &str) -> Result<(), Box<dyn std::error::Error>> {
    controller.connect().await?;
    controller.set_amount(amount)?;

    match controller.purchase().await {
        PurchaseTrigger::Completed(receipt) => {
            let view = controller.view();
            tracing::info!(
                approval_tx = ?receipt.approval_tx,
                purchase_tx = ?receipt.purchase_tx,
                balance = %view.balance_display,
                "Purchase complete"
            );
            Ok(())
        }
        PurchaseTrigger::Failed(e) => Err(e.into()),
        PurchaseTrigger::Disabled | PurchaseTrigger::Ignored => {
            Err("purchase could not be started".into())
        }
    }
}

#[tokio::main]
async fn main() {
    let loaded = load_config();

    // -------------------------------
    // Initialize Tracing / Logging
    // -------------------------------
    // RUST_LOG reaches the config through its environment source.
    let directives = match &loaded {
        Ok(config) => config.rust_log.clone(),
        Err(_) => "info".to_string(),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(directives))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // -------------------------------
    // Load configuration
    // -------------------------------
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let controller = match build_controller(&config) {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // -------------------------------
    // CLI Argument Handling (one-shot purchase)
    // -------------------------------
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "buy" {
        let Some(amount) = args.get(2) else {
            tracing::error!("Usage: issuance buy <amount>");
            std::process::exit(2);
        };
        if let Err(e) = buy_once(&controller, amount).await {
            tracing::error!("Purchase failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if config.auto_connect {
        controller.spawn_connect();
    }

    // -------------------------------
    // Web Server Setup
    // -------------------------------
    let app = api::router(Arc::clone(&controller));

    let bind_addr = format!("0.0.0.0:{}", config.server_port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
