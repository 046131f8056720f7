/// Initializes the tracing/logging infrastructure for the demo.
///
/// This sets up structured logging using the `tracing` crate with
/// environment-based filtering, controlled via the `RUST_LOG` environment
/// variable:
///
/// - `RUST_LOG=info` - lifecycle events (spawns, stops)
/// - `RUST_LOG=debug` - plus per-message dispatch and supervision decisions
/// - `RUST_LOG=actor_engine=debug` - debug only for the engine
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
