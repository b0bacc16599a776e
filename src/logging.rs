use tracing_subscriber::EnvFilter;

/// One-shot subscriber init, `RUST_LOG`-driven with an `info` default — the
/// harness's whole output is a reviewable sequential run log of structured
/// events.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
