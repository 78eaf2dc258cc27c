//! Download metadata cache
//!
//! Keeps enough state between runs that unchanged remote artifacts are not
//! downloaded again.
//!
//! # Lifecycle
//!
//! | Step | Component | When |
//! |------|-----------|------|
//! | Load | `CacheStore::load` | once at startup |
//! | Replay | `PlaceholderReplicator` | once, before any recipe runs |
//! | Record | `MetadataRecorder` | after each recipe whose tool run succeeded |
//!
//! Entries are keyed by recipe file name, so two recipes sharing a file
//! name in different search directories share one entry.

pub mod recorder;
pub mod replicate;
pub mod store;

pub use recorder::{find_downloads_dir, MetadataRecorder, PrimaryDownload, BONUS_MIN_BYTES};
pub use replicate::{home_short_name, localize_path, PlaceholderReplicator, ReplicationSummary};
pub use store::{CacheEntry, CacheStore, DownloadRecord, MetadataCache};
