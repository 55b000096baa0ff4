//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the caller's default directive is
//! used (e.g. `"insight_flow=info"`). Output goes to stderr.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Later calls are no-ops.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init("insight_flow=debug");
        init("insight_flow=info");
        tracing::info!("logging initialized");
    }
}
