#![forbid(unsafe_code)]

pub mod blocks;
pub mod book_id;
pub mod cli;
pub mod config;
pub mod error;
pub mod formats;
pub mod logging;
pub mod notion;
pub mod record;
pub mod retry;
pub mod run;
pub mod session;
pub mod sync;
pub mod weread;
