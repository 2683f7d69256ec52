use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `EGS_LOG` first, then `RUST_LOG`, then a default.
///
/// Log field contract for allocator events (`target: "egs_alloc"`):
/// - Always include `event` naming the step.
/// - Include `stream` on any per-stream event and `job`/`archive` on any per-cell event.
/// - Include `prefix` once at start so runs sharing one egs dir can be told apart.
pub fn init_tracing() {
    let filter = env_filter();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("EGS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
