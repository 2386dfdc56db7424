pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod mapping;
pub mod polls;
pub mod profile;
pub mod session;

pub use error::{ServiceError, ServiceResult};
pub use feed::Feed;
pub use profile::{ProfileService, ProfileUpdate};
pub use session::{Session, SnapshotApplied, SyncHandle};
