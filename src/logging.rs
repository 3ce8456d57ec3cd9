use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DIRECTIVES: &str = "weighbot=info";
const VERBOSE_DIRECTIVES: &str = "weighbot=debug";

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose { VERBOSE_DIRECTIVES } else { DEFAULT_DIRECTIVES }
}

/// Install the global subscriber. `RUST_LOG` overrides the defaults.
/// Verbose runs also print the module each event came from.
pub fn init_logger(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(verbose);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
