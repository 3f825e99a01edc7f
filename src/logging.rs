use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Install the global subscriber. Levels come from `ALUMNI_LOG`
/// (e.g. `ALUMNI_LOG=alumni_targeting=debug`), defaulting to info.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("ALUMNI_LOG")
            .unwrap_or_else(|_| EnvFilter::new("alumni_targeting=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}
