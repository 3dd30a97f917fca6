use std::sync::Arc;

use parcel_dispatch::api;
use parcel_dispatch::config::Config;
use parcel_dispatch::engine::notify::run_notification_dispatcher;
use parcel_dispatch::engine::pricing::PricingRule;
use parcel_dispatch::error::AppError;
use parcel_dispatch::gateways::geocode::{DisabledGeocoder, GoogleGeocoder};
use parcel_dispatch::gateways::kopokopo::KopoKopoGateway;
use parcel_dispatch::gateways::sms::AfricasTalkingGateway;
use parcel_dispatch::gateways::{Geocoder, SmsGateway};
use parcel_dispatch::state::{AppState, Collaborators, StateSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let geocoder: Arc<dyn Geocoder> = match config.google_maps_api_key.clone() {
        Some(key) => Arc::new(GoogleGeocoder::new(key)?),
        None => {
            tracing::warn!("GOOGLE_MAPS_API_KEY not set; addresses will not be geocoded");
            Arc::new(DisabledGeocoder)
        }
    };
    let sms: Arc<dyn SmsGateway> = Arc::new(AfricasTalkingGateway::new(config.sms.clone())?);
    let payment_gateway = Arc::new(KopoKopoGateway::new(config.kopokopo.clone())?);

    let (app_state, notification_rx) = AppState::new(
        StateSettings {
            pricing: PricingRule::from(&config.pricing),
            payment_callback_url: config.payment_callback_url(),
            notification_queue_size: config.notification_queue_size,
            event_buffer_size: config.event_buffer_size,
        },
        Collaborators {
            payment_gateway,
            geocoder,
        },
    );
    let shared_state = Arc::new(app_state);

    tokio::spawn(run_notification_dispatcher(
        shared_state.clone(),
        sms,
        notification_rx,
    ));

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        callback_url = %config.payment_callback_url(),
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
