pub mod ai;
pub mod app;
pub mod auth;
pub mod config;
pub mod mail;
pub mod problem;
pub mod state;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

const DEFAULT_LOG_FILTER: &str = "accounts=debug,axum=info,tower_http=info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.with_target(false).json().init();
    } else {
        builder.init();
    }
}
