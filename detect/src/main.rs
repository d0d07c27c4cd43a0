use anyhow::Result;
use detect::config::Args;
use std::env;
use structopt::StructOpt;
use tracing::info_span;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

pub fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    // parse arguments
    let config = Args::from_args().into_config()?;

    // start detection program
    let _span = info_span!("detect").entered();
    detect::start(&config)?;

    Ok(())
}
