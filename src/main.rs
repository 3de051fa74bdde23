//! HTTP server exposing the anonymous token issuance endpoint.

// crates.io
use axum::{
	Router,
	extract::State,
	http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE},
	response::{IntoResponse, Response},
	routing::any,
};
use color_eyre::Result;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
// self
use anon_token_broker::{config::BrokerConfig, endpoint::IssuanceResponse, flows::Broker};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::registry()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("anon_token_broker=info")),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = BrokerConfig::from_env()?;
	let bind_address = config.bind_address;

	tracing::info!(
		base_url = %config.base_url,
		daily_limit = config.daily_limit,
		token_ttl = %config.token_ttl,
		"configuration loaded"
	);

	let broker = Broker::from_config(config)?;
	let app = Router::new()
		.route("/", any(issue))
		.route("/get-anon-token", any(issue))
		.with_state(broker);
	let listener = TcpListener::bind(bind_address).await?;

	tracing::info!(address = %listener.local_addr()?, "issuance endpoint listening");

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	tracing::info!("issuance endpoint stopped");

	Ok(())
}

async fn issue(State(broker): State<Broker>, method: Method, headers: HeaderMap) -> Response {
	let response = broker.handle(&method, &headers).await;
	let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

	(status, [(CONTENT_TYPE, IssuanceResponse::CONTENT_TYPE)], response.to_bytes()).into_response()
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "failed to listen for the shutdown signal");
		std::future::pending::<()>().await;
	}
}
