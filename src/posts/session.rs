//! One compose/edit session: load, mutate, submit, upload.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::api::PostApi;
use super::error::{PostError, Result, TransportError, UploadFailure};
use super::images::{
    plan_uploads, reconcile, upload_targets, ImageRecord, OriginalImageSet, PlannedUpload,
    UploadTarget, WorkingImageSet,
};
use super::schema::{BoardResponse, EditPostRequest, ImageResponse, PostRequest, PostResponse};
use super::transport::ImageTransport;

/// Result of uploading one image.
#[derive(Debug)]
pub struct UploadOutcome {
    pub filename: String,
    pub result: std::result::Result<(), UploadFailure>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Text fields of a post being submitted.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: Option<String>,
    pub contents: String,
    pub is_question: bool,
    pub is_anonymous: bool,
}

/// What came back from a successful submit.
#[derive(Debug)]
pub struct SubmitReport {
    pub post: PostResponse,
    pub uploads: Vec<UploadOutcome>,
}

impl SubmitReport {
    pub fn failed_uploads(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.uploads.iter().filter(|o| !o.is_success())
    }
}

/// Load the original images of a post. Fetches run concurrently; any single
/// failure fails the whole load so a resubmit never silently drops images.
pub async fn initialize(
    transport: &dyn ImageTransport,
    original_images: Option<&[ImageResponse]>,
    fetch_concurrency: usize,
) -> Result<(WorkingImageSet, OriginalImageSet)> {
    let Some(images) = original_images else {
        return Ok((WorkingImageSet::new(), OriginalImageSet::default()));
    };

    // Bounded fan-out, results kept in descriptor order.
    let fetched: Vec<ImageRecord> = stream::iter(images.iter().map(|image| async move {
        let url = image
            .pre_signed_url
            .as_deref()
            .ok_or_else(|| PostError::ImageLoadFailure {
                filename: image.filename.clone(),
                source: TransportError::InvalidUrl("image has no presigned URL".to_string()),
            })?;
        debug!("loading original image {}", image.filename);
        let bytes = transport
            .fetch(url)
            .await
            .map_err(|source| PostError::ImageLoadFailure {
                filename: image.filename.clone(),
                source,
            })?;
        Ok::<_, PostError>(ImageRecord {
            local_id: image.image_id,
            filename: image.filename.clone(),
            description: image.description.clone().unwrap_or_default(),
            bytes,
        })
    }))
    .buffered(fetch_concurrency.max(1))
    .collect::<Vec<_>>()
    .await
    .into_iter()
    .collect::<Result<_>>()?;

    info!("loaded {} original image(s)", fetched.len());
    let original = OriginalImageSet::new(fetched.clone());
    Ok((WorkingImageSet::from_records(fetched), original))
}

/// Upload every eligible image. Failures are recorded per image and never
/// stop the others. Outcomes follow working-set order.
pub async fn upload_pending(
    transport: &dyn ImageTransport,
    working: &WorkingImageSet,
    original: &OriginalImageSet,
    targets: &[UploadTarget],
    is_edit: bool,
    concurrency: usize,
) -> Vec<UploadOutcome> {
    let plan = plan_uploads(working, original, targets, is_edit);
    if plan.is_empty() {
        debug!("no images need upload");
        return Vec::new();
    }
    info!("uploading {} image(s)", plan.len());

    stream::iter(plan.into_iter().map(|PlannedUpload { filename, url, bytes }| async move {
        let result = upload_one(transport, url.as_deref(), bytes).await;
        if let Err(e) = &result {
            warn!("cannot upload image {}: {}", filename, e);
        }
        UploadOutcome { filename, result }
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await
}

async fn upload_one(
    transport: &dyn ImageTransport,
    url: Option<&str>,
    bytes: Bytes,
) -> std::result::Result<(), UploadFailure> {
    let url = url.ok_or(UploadFailure::MissingTarget)?;
    transport.upload(url, bytes).await?;
    Ok(())
}

/// Knobs for a session's network fan-out.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub fetch_concurrency: usize,
    pub upload_concurrency: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            fetch_concurrency: 4,
            upload_concurrency: 4,
        }
    }
}

/// A single editing session. The host owns it and drives it from one task.
pub struct ComposeSession {
    api: Arc<dyn PostApi>,
    transport: Arc<dyn ImageTransport>,
    limits: SessionLimits,
    board: BoardResponse,
    original_post: Option<PostResponse>,
    working: WorkingImageSet,
    original: OriginalImageSet,
    // Set once the backend accepted the post; blocks a duplicate submit.
    submitted_post: Option<i64>,
}

impl ComposeSession {
    /// Load the board, and in the edit flow the post and its images.
    pub async fn open(
        api: Arc<dyn PostApi>,
        transport: Arc<dyn ImageTransport>,
        limits: SessionLimits,
        board_id: i64,
        post_id: Option<i64>,
    ) -> Result<Self> {
        let board = api
            .get_board(board_id)
            .await
            .map_err(|source| PostError::BoardLoadFailure { board_id, source })?;

        let original_post = match post_id {
            Some(post_id) => Some(
                api.get_post(board_id, post_id)
                    .await
                    .map_err(|source| PostError::PostLoadFailure { post_id, source })?,
            ),
            None => None,
        };

        let (working, original) = initialize(
            transport.as_ref(),
            original_post.as_ref().map(|p| p.images.as_deref().unwrap_or(&[])),
            limits.fetch_concurrency,
        )
        .await?;

        Ok(Self {
            api,
            transport,
            limits,
            board,
            original_post,
            working,
            original,
            submitted_post: None,
        })
    }

    pub fn board(&self) -> &BoardResponse {
        &self.board
    }

    pub fn original_post(&self) -> Option<&PostResponse> {
        self.original_post.as_ref()
    }

    pub fn is_edit(&self) -> bool {
        self.original_post.is_some()
    }

    pub fn working(&self) -> &WorkingImageSet {
        &self.working
    }

    pub fn original(&self) -> &OriginalImageSet {
        &self.original
    }

    pub fn add_image(
        &mut self,
        filename: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<&WorkingImageSet> {
        self.working = self.working.add_image(filename, bytes)?;
        Ok(&self.working)
    }

    pub fn edit_description(
        &mut self,
        local_id: i64,
        filename: &str,
        description: impl Into<String>,
    ) -> &WorkingImageSet {
        self.working = self.working.edit_description(local_id, filename, description);
        &self.working
    }

    pub fn delete_image(&mut self, local_id: i64, filename: &str) -> &WorkingImageSet {
        self.working = self.working.delete_image(local_id, filename);
        &self.working
    }

    /// Hand the working set to a lock-guarded handle for concurrent editing.
    /// Call [`ComposeSession::adopt_shared`] before submitting.
    pub fn share(&self) -> SharedSession {
        SharedSession::new(self.working.clone())
    }

    /// Take over the state edited through a [`SharedSession`].
    pub fn adopt_shared(&mut self, shared: &SharedSession) -> &WorkingImageSet {
        self.working = shared.snapshot();
        &self.working
    }

    /// Post id accepted by the backend, once submitted.
    pub fn submitted_post(&self) -> Option<i64> {
        self.submitted_post
    }

    /// Create or edit the post, then upload the images the backend asked for.
    ///
    /// In the edit flow the question/anonymous flags of the original post are
    /// kept and the draft's values are ignored.
    ///
    /// A rejected submit leaves the session untouched and may be retried.
    /// Once the backend accepts the post, further submits fail with
    /// `AlreadySubmitted`.
    pub async fn submit(&mut self, draft: PostDraft) -> Result<SubmitReport> {
        if let Some(post_id) = self.submitted_post {
            return Err(PostError::AlreadySubmitted { post_id });
        }
        let is_edit = self.is_edit();
        let reconciled = reconcile(&self.working, &self.original, is_edit);
        let board_id = self.board.board_id;

        let post = match &self.original_post {
            Some(original) => {
                let request = EditPostRequest {
                    title: draft.title,
                    contents: draft.contents,
                    is_question: original.is_question,
                    is_writer_anonymous: original.is_writer_anonymous,
                    images: reconciled.images_to_submit,
                    deleted_images: reconciled.deleted_filenames,
                };
                info!("editing post {} on board {}", original.post_id, board_id);
                self.api
                    .edit_post(board_id, original.post_id, &request)
                    .await?
            }
            None => {
                let request = PostRequest {
                    title: draft.title,
                    contents: draft.contents,
                    is_question: draft.is_question,
                    is_anonymous: draft.is_anonymous,
                    images: reconciled.images_to_submit,
                };
                info!("creating post on board {}", board_id);
                self.api.create_post(board_id, &request).await?
            }
        };
        self.submitted_post = Some(post.post_id);

        let uploads = match post.images.as_deref() {
            Some(images) => {
                let targets = upload_targets(images);
                upload_pending(
                    self.transport.as_ref(),
                    &self.working,
                    &self.original,
                    &targets,
                    is_edit,
                    self.limits.upload_concurrency,
                )
                .await
            }
            None => Vec::new(),
        };

        Ok(SubmitReport { post, uploads })
    }
}

/// Working set guarded for hosts that may mutate it from several tasks.
/// Every mutation runs under one lock so ids stay monotonic and no update is lost.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    working: Arc<Mutex<WorkingImageSet>>,
}

impl SharedSession {
    pub fn new(working: WorkingImageSet) -> Self {
        Self {
            working: Arc::new(Mutex::new(working)),
        }
    }

    /// Current state, for rendering.
    pub fn snapshot(&self) -> WorkingImageSet {
        self.working.lock().clone()
    }

    pub fn add_image(
        &self,
        filename: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<WorkingImageSet> {
        let mut guard = self.working.lock();
        *guard = guard.add_image(filename, bytes)?;
        Ok(guard.clone())
    }

    pub fn edit_description(
        &self,
        local_id: i64,
        filename: &str,
        description: impl Into<String>,
    ) -> WorkingImageSet {
        let mut guard = self.working.lock();
        *guard = guard.edit_description(local_id, filename, description);
        guard.clone()
    }

    pub fn delete_image(&self, local_id: i64, filename: &str) -> WorkingImageSet {
        let mut guard = self.working.lock();
        *guard = guard.delete_image(local_id, filename);
        guard.clone()
    }
}
