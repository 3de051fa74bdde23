//! Issue short-lived anonymous access tokens: per-IP daily quotas, throwaway upstream identities,
//! and compensating cleanup when the credential exchange fails.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod provider;
pub mod store;
pub mod upstream;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		clock::{Clock, FixedClock},
		config::BrokerConfig,
		flows::Broker,
		provider::{IdentityProvider, MemoryProvider},
		store::{IssuanceStore, MemoryStore},
	};

	/// Service credential shared by every test configuration.
	pub const TEST_SERVICE_KEY: &str = "service-role-test-key";

	/// Builds a configuration pointing at `base_url` with the provided quota and TTL.
	pub fn test_config(base_url: &str, daily_limit: u64, ttl_minutes: i64) -> BrokerConfig {
		BrokerConfig::new(
			Url::parse(base_url).expect("Test base URL should parse."),
			TEST_SERVICE_KEY,
		)
		.with_daily_limit(daily_limit)
		.with_token_ttl(Duration::minutes(ttl_minutes))
	}

	/// Constructs a [`Broker`] backed by the in-memory provider + store and a fixed clock.
	pub fn build_memory_test_broker(
		config: BrokerConfig,
		now: OffsetDateTime,
	) -> (Broker, Arc<MemoryProvider>, Arc<MemoryStore>, Arc<FixedClock>) {
		let provider_backend = Arc::new(MemoryProvider::default());
		let store_backend = Arc::new(MemoryStore::default());
		let clock_backend = Arc::new(FixedClock::new(now));
		let provider: Arc<dyn IdentityProvider> = provider_backend.clone();
		let store: Arc<dyn IssuanceStore> = store_backend.clone();
		let clock: Arc<dyn Clock> = clock_backend.clone();
		let broker = Broker::new(Arc::new(config), provider, store).with_clock(clock);

		(broker, provider_backend, store_backend, clock_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Date, Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
#[cfg(feature = "server")] use {axum as _, color_eyre as _, tokio as _, tracing_subscriber as _};
