//! List the objects of a store
//!
//! Usage: `objls SPEC [PREFIX]`, where SPEC is anything the storage factory
//! accepts. Prints one `key size mtime` line per object.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storage::StorageFactory;
use sync_core::SyncConfig;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storage=info,sync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(spec) = args.next() else {
        eprintln!("usage: objls SPEC [PREFIX]");
        return ExitCode::from(2);
    };
    let prefix = args.next().unwrap_or_default();

    let config = SyncConfig::default();
    let page_size = config.listing.page_size;
    let mut factory = StorageFactory::new(config);

    let created = match factory.create(&spec).await {
        Ok(created) => created,
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, "Invalid storage specification");
            return ExitCode::from(2);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create storage");
            return ExitCode::FAILURE;
        }
    };

    let store = created.store;
    let mut marker = String::new();
    let mut total = 0usize;

    loop {
        let page = match store.list(&prefix, &marker, page_size).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(error = %e, %store, "Listing failed");
                return ExitCode::FAILURE;
            }
        };
        let Some(last) = page.last() else {
            break;
        };
        marker = last.key.clone();

        for object in &page {
            println!("{}\t{}\t{}", object.key, object.size, object.mtime.to_rfc3339());
        }
        total += page.len();
    }

    tracing::info!(%store, total, "Listing complete");
    ExitCode::SUCCESS
}
