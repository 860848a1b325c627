use tracing::metadata::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{prelude::*, EnvFilter};

use environment::HTTP_ENVIRONMENT;

mod environment;
mod router;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Setup error reporting
    color_eyre::install()?;

    // Setup logging
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(LevelFilter::INFO.into())
                .add_directive("webpage=trace".parse()?)
                .add_directive(format!("{}=trace", env!("CARGO_CRATE_NAME")).parse()?),
        )
        .finish()
        .with(ErrorLayer::default())
        .init();

    router::router(&HTTP_ENVIRONMENT).await
}
