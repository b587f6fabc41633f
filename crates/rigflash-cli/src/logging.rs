use tracing_subscriber::EnvFilter;

pub(crate) fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

// Diagnostics go to stderr so stdout only carries operator progress.
// `RUST_LOG` wins over `--verbose` when set.
pub(crate) fn init_tracing(verbose: bool) {
    use tracing_subscriber::prelude::*;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .try_init();
}
