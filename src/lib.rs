//! stagedoor - artist track submission, moderation, and streaming service
//!
//! Artists upload audio into a per-user pending area; admins approve tracks
//! into the public catalog or reject them outright. The crate provides:
//! - File-per-record JSON metadata with atomic tmp+rename writes
//! - A Pending -> Approved moderation state machine with per-track locking
//! - Filesystem-derived storage and pending-count quotas
//! - Byte-range streaming of stored audio
//! - REST API with JWT auth and multipart upload support

pub mod api;
pub mod audit;
pub mod auth;
pub mod backup;
pub mod config;
pub mod delivery;
pub mod lifecycle;
pub mod media;
pub mod sanitize;
pub mod store;

use audit::AuditLog;
use backup::BackupService;
use config::Config;
use delivery::StreamDelivery;
use lifecycle::TrackLifecycle;
use media::MediaStore;
use store::{MetaStore, UserStore};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub users: UserStore,
    pub meta: MetaStore,
    pub media: MediaStore,
    pub lifecycle: TrackLifecycle,
    pub delivery: StreamDelivery,
    pub audit: AuditLog,
    pub backup: BackupService,
}
