//! Posts — image attachment handling for post create/edit
//!
//! Tracks the working and original image sets of a compose session,
//! reconciles them into the submit payload, and uploads image bytes to the
//! presigned URLs the backend hands back.

pub mod api;
pub mod attachments;
pub mod error;
pub mod images;
pub mod schema;
pub mod session;
pub mod transport;

pub use api::{HttpPostApi, PostApi};
pub use error::{LocalIdExhausted, PostError, SubmitError, TransportError, UploadFailure};
pub use images::{
    reconcile, upload_targets, ImageRecord, OriginalImageSet, ReconciliationResult, UploadTarget,
    WorkingImageSet,
};
pub use session::{
    initialize, upload_pending, ComposeSession, PostDraft, SessionLimits, SharedSession,
    SubmitReport, UploadOutcome,
};
pub use transport::{HttpImageTransport, ImageTransport};
