#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Watchpost daemon: loads validations and runs them on their schedules.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchpost_core::{Catalog, Services};
use watchpost_daemon::{Args, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = args.resolve_settings()?;
    let mut catalog = Catalog::new();
    let services = Services::resolve(&catalog, settings.clone())?.into_shared();
    catalog.register_builtins(&services);

    let mut scheduler = Scheduler::new(&settings, catalog, args.scheduler_options());
    let loaded = scheduler.load()?;
    tracing::info!(
        directory = %settings.directory.display(),
        loaded,
        validations = scheduler.registry().len(),
        "daemon starting"
    );

    scheduler.start().await
}
