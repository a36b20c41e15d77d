use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

///Install the global subscriber.
///
///`RUST_LOG` overrides the `info` default, `LOG_FORMAT=json` switches to one JSON object per
///line. Logs go to stderr, stdout is left to command output.
pub fn init() {
	let use_json = std::env::var("LOG_FORMAT")
		.map(|format| format.eq_ignore_ascii_case("json"))
		.unwrap_or(false);
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
	let registry = tracing_subscriber::registry().with(env_filter);
	if use_json {
		registry
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		registry
			.with(
				fmt::layer()
					.with_ansi(true)
					.with_target(true)
					.with_writer(std::io::stderr),
			)
			.init();
	}
}
