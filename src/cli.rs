use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Copy new books, highlights and reviews from WeRead into Notion.
    Sync(SyncArgs),
    /// Print the WeRead reader URL for a book id.
    BookUrl(BookUrlArgs),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// WeRead base URL.
    #[arg(long, default_value = crate::weread::DEFAULT_BASE_URL)]
    pub weread_base_url: String,

    /// Notion API base URL.
    #[arg(long, default_value = crate::notion::DEFAULT_BASE_URL)]
    pub notion_base_url: String,

    /// Delay between retries of a failed WeRead call.
    #[arg(long, default_value_t = 5000)]
    pub retry_delay_ms: u64,

    /// Delay before each Notion block append (rate limiting).
    #[arg(long, default_value_t = 300)]
    pub throttle_ms: u64,
}

#[derive(Debug, Args)]
pub struct BookUrlArgs {
    /// WeRead `bookId` (numeric or alphanumeric).
    pub book_id: String,

    /// WeRead base URL.
    #[arg(long, default_value = crate::weread::DEFAULT_BASE_URL)]
    pub weread_base_url: String,
}
