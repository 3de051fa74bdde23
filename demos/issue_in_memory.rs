//! Drives the issuance pipeline end to end without touching the network.
//!
//! 1. Back the [`Broker`] with [`MemoryProvider`] and [`MemoryStore`].
//! 2. Issue tokens for one address until its daily quota runs out.
//! 3. Show the `429` body the endpoint answers with once the quota is exceeded.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use anon_token_broker::{
	auth::ClientIp,
	config::BrokerConfig,
	flows::Broker,
	http_types::{HeaderMap, HeaderValue, Method},
	provider::MemoryProvider,
	store::{MemoryStore, RateLimitKey},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = BrokerConfig::new(Url::parse("https://project.supabase.co")?, "local-service-key")
		.with_daily_limit(3)
		.with_token_ttl(Duration::minutes(15));
	let provider = Arc::new(MemoryProvider::default());
	let store = Arc::new(MemoryStore::default());
	let broker = Broker::new(Arc::new(config), provider.clone(), store.clone());
	let ip = ClientIp::new("203.0.113.5")?;

	for _ in 0..3 {
		let issuance = broker.issue(&ip).await?;

		println!(
			"request {} -> {} (expires {})",
			issuance.count, issuance.user.email, issuance.token.expires_at
		);
	}

	let mut headers = HeaderMap::new();

	headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));

	let refused = broker.handle(&Method::POST, &headers).await;
	let today = OffsetDateTime::now_utc().date();

	println!("request 4 -> {} {}", refused.status, refused.body);
	println!(
		"identities alive: {}, counter: {:?}, audit rows: {}",
		provider.len(),
		store.count(&RateLimitKey::new(ip, today)),
		store.audit_records().len()
	);

	Ok(())
}
