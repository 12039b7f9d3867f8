//! Core traits for the ddns6 system
//!
//! These are the two capabilities the outside world supplies:
//!
//! - [`AddressFetcher`]: obtain the host's current public address
//! - [`RecordUpdater`]: push an address to a DNS provider

pub mod fetcher;
pub mod updater;

pub use fetcher::AddressFetcher;
pub use updater::{RecordUpdater, UpdateOutcome};
