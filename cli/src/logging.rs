//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATES: [&str; 4] = ["stakeindex", "stakeindex_core", "stakeindex_storage", "stakeindex_mina"];

/// Filter directives: `info` globally, our crates at `debug` when asked.
pub fn directives(debug: bool) -> String {
    let mut directives = String::from("info");
    if debug {
        for component in CRATES {
            directives.push_str(&format!(",{component}=debug"));
        }
    }
    directives
}

/// Install the global subscriber. `RUST_LOG` replaces the computed filter.
pub fn init_tracing(debug: bool, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(debug)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(())
}
