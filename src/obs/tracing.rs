// self
use crate::{_prelude::*, auth::ClientIp, obs::Stage};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedStage<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedStage<F> = F;

/// Span wrapping one pipeline stage for one requester.
#[derive(Clone, Debug)]
pub struct StageSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl StageSpan {
	/// Creates a new span tagged with `stage` and, when known at the call site, the requester
	/// address. Nested stages inherit the address from the enclosing span.
	pub fn new(stage: Stage, ip: Option<&ClientIp>) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"anon_token_broker.stage",
				stage = stage.as_str(),
				ip = ip.map(AsRef::<str>::as_ref)
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, ip);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedStage<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs a failure the pipeline deliberately does not propagate.
pub fn log_swallowed(stage: Stage, error: &(dyn StdError + 'static)) {
	#[cfg(feature = "tracing")]
	{
		let source = error.source().map(ToString::to_string);

		tracing::warn!(
			stage = stage.as_str(),
			error = %error,
			source = source.as_deref(),
			"ignored stage failure"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, error);
	}
}

/// Logs the terminal state of a request, the last state it reached, and the response status.
pub fn log_termination(state: &'static str, reached: &'static str, status: u16) {
	#[cfg(feature = "tracing")]
	{
		if status >= 500 {
			tracing::error!(state, reached, status, "issuance request terminated");
		} else if status >= 400 {
			tracing::info!(state, reached, status, "issuance request terminated");
		} else {
			tracing::debug!(state, reached, status, "issuance request terminated");
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (state, reached, status);
	}
}
