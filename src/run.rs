use std::time::Duration;

use anyhow::Context as _;

use crate::cli::{BookUrlArgs, SyncArgs};
use crate::config::{Config, Env};
use crate::notion::NotionClient;
use crate::retry::RetryPolicy;
use crate::sync::{SyncOptions, SyncReport, Syncer};
use crate::weread::WereadClient;

pub fn sync(args: SyncArgs) -> anyhow::Result<()> {
    let config = Config::resolve(&Env::from_env()).context("load configuration")?;

    let retry = RetryPolicy::with_delay(Duration::from_millis(args.retry_delay_ms));
    let catalog = WereadClient::new(&args.weread_base_url, &config.weread_cookie, retry)
        .context("create WeRead client")?;
    match catalog.touch() {
        Ok(status) => tracing::info!(%status, "WeRead home page reached"),
        Err(err) => tracing::warn!(error = %format!("{err:#}"), "WeRead home page unreachable"),
    }

    let store = NotionClient::connect(&args.notion_base_url, &config.notion_token, &config.database_id)
        .context("connect to Notion")?;

    let options = SyncOptions {
        reader_base_url: args.weread_base_url.clone(),
        throttle: Duration::from_millis(args.throttle_ms),
        ..SyncOptions::default()
    };
    let report = Syncer::new(&catalog, &store, options).run()?;
    print_summary(&report);

    if report.aborted {
        anyhow::bail!("sync aborted: WeRead session expired");
    }
    Ok(())
}

fn print_summary(report: &SyncReport) {
    let stats = report.stats;
    tracing::info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        skipped = stats.skipped,
        aborted = report.aborted,
        "sync finished"
    );
    println!(
        "synced: {} succeeded, {} failed, {} skipped",
        stats.succeeded, stats.failed, stats.skipped
    );
}

pub fn book_url(args: BookUrlArgs) -> anyhow::Result<()> {
    let book_id = args.book_id.trim();
    if book_id.is_empty() {
        anyhow::bail!("book id must not be empty");
    }
    println!(
        "{}",
        crate::book_id::reader_url(&args.weread_base_url, book_id)
    );
    Ok(())
}
