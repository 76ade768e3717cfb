#![recursion_limit = "256"]

use clap::Parser;
use stylus_cli::Cli;

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    #[cfg(feature = "tracy")]
    {
        use tracing_subscriber::layer::SubscriberExt;

        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(tracing_tracy::TracyLayer::default()),
        )
        .expect("Failed to set tracing subscriber");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to initialize tokio runtime");

    runtime.block_on(async move {
        env_logger::builder()
            .target(env_logger::Target::Stdout)
            .init();
        stylus_cli::run(cli).await
    })
}
