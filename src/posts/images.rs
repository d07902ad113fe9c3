//! Image-set bookkeeping for the compose/edit flow.
//!
//! All operations take a set by reference and return a new set, so the host
//! can keep snapshots for rendering without sharing mutable state.

use bytes::Bytes;

use super::error::LocalIdExhausted;
use super::schema::{ImageRequest, ImageResponse};

/// One image attached to a post, either added locally or loaded from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub local_id: i64,
    pub filename: String,
    pub description: String,
    pub bytes: Bytes,
}

impl ImageRecord {
    fn matches(&self, local_id: i64, filename: &str) -> bool {
        self.local_id == local_id && self.filename == filename
    }

    /// Metadata sent with the post; never carries bytes.
    pub fn to_request(&self) -> ImageRequest {
        ImageRequest {
            image_id: self.local_id,
            file_name: self.filename.clone(),
            description: self.description.clone(),
        }
    }
}

/// The user's current attachments, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingImageSet {
    records: Vec<ImageRecord>,
    // Above every id ever held by the set, so deleting the tail never frees
    // an id. `None` once `i64::MAX` has been handed out.
    next_local_id: Option<i64>,
}

impl Default for WorkingImageSet {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            next_local_id: Some(0),
        }
    }
}

/// Attachments as they existed on the server when editing started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalImageSet {
    records: Vec<ImageRecord>,
}

impl WorkingImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids come from the backend and may sit anywhere in `i64`.
    pub fn from_records(records: Vec<ImageRecord>) -> Self {
        let next_local_id = records
            .iter()
            .map(|r| r.local_id)
            .max()
            .map_or(Some(0), |max| max.checked_add(1));
        Self {
            records,
            next_local_id,
        }
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a new image with an empty description.
    ///
    /// The new id is one past the last record's id, or past any id already
    /// deleted, whichever is higher. Fails only once `i64::MAX` was issued.
    pub fn add_image(
        &self,
        filename: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<Self, LocalIdExhausted> {
        let local_id = self.next_local_id.ok_or(LocalIdExhausted)?;
        let mut records = self.records.clone();
        records.push(ImageRecord {
            local_id,
            filename: filename.into(),
            description: String::new(),
            bytes: bytes.into(),
        });
        Ok(Self {
            records,
            next_local_id: local_id.checked_add(1),
        })
    }

    /// Replace the description of the first image matching `(local_id, filename)`.
    /// Unknown identities leave the set unchanged.
    pub fn edit_description(
        &self,
        local_id: i64,
        filename: &str,
        description: impl Into<String>,
    ) -> Self {
        let mut next = self.clone();
        if let Some(record) = next
            .records
            .iter_mut()
            .find(|r| r.matches(local_id, filename))
        {
            record.description = description.into();
        }
        next
    }

    /// Remove every image matching `(local_id, filename)`.
    pub fn delete_image(&self, local_id: i64, filename: &str) -> Self {
        let mut next = self.clone();
        next.records.retain(|r| !r.matches(local_id, filename));
        next
    }

    pub fn contains_filename(&self, filename: &str) -> bool {
        self.records.iter().any(|r| r.filename == filename)
    }
}

impl OriginalImageSet {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_filename(&self, filename: &str) -> bool {
        self.records.iter().any(|r| r.filename == filename)
    }
}

/// What to send alongside the post text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// `None` when there are no images; the backend treats an absent field
    /// differently from an empty list.
    pub images_to_submit: Option<Vec<ImageRequest>>,
    /// Filenames of original images that were removed. Edit flow only.
    pub deleted_filenames: Option<Vec<String>>,
}

/// Diff the working set against the original.
///
/// Removed images are detected by filename alone: the backend identifies
/// prior images by filename, not by local id.
pub fn reconcile(
    working: &WorkingImageSet,
    original: &OriginalImageSet,
    is_edit: bool,
) -> ReconciliationResult {
    let images: Vec<ImageRequest> = working.records.iter().map(ImageRecord::to_request).collect();

    let deleted_filenames = if is_edit {
        let mut deleted: Vec<String> = Vec::new();
        for old in &original.records {
            if !working.contains_filename(&old.filename) && !deleted.contains(&old.filename) {
                deleted.push(old.filename.clone());
            }
        }
        Some(deleted).filter(|d| !d.is_empty())
    } else {
        None
    };

    ReconciliationResult {
        images_to_submit: Some(images).filter(|i| !i.is_empty()),
        deleted_filenames,
    }
}

/// Server-issued destination for one image's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub image_id: i64,
    pub filename: String,
    pub url: String,
}

/// Collect upload targets from a create/edit response. Images without a
/// presigned URL need no upload and are left out.
pub fn upload_targets(images: &[ImageResponse]) -> Vec<UploadTarget> {
    images
        .iter()
        .filter_map(|image| {
            image.pre_signed_url.as_ref().map(|url| UploadTarget {
                image_id: image.image_id,
                filename: image.filename.clone(),
                url: url.clone(),
            })
        })
        .collect()
}

/// One image selected for upload. `url` is `None` when the backend issued no target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub filename: String,
    pub url: Option<String>,
    pub bytes: Bytes,
}

/// Decide which working images must be uploaded and where.
///
/// Create flow matches targets by local id and only plans images that have
/// one. Edit flow skips images whose filename already exists on the server
/// and matches the rest by filename; a missing target is still planned so
/// the caller reports it.
pub fn plan_uploads(
    working: &WorkingImageSet,
    original: &OriginalImageSet,
    targets: &[UploadTarget],
    is_edit: bool,
) -> Vec<PlannedUpload> {
    let mut planned = Vec::new();
    for record in &working.records {
        if is_edit {
            if original.contains_filename(&record.filename) {
                continue;
            }
            let url = targets
                .iter()
                .find(|t| t.filename == record.filename)
                .map(|t| t.url.clone());
            planned.push(PlannedUpload {
                filename: record.filename.clone(),
                url,
                bytes: record.bytes.clone(),
            });
        } else if let Some(target) = targets.iter().find(|t| t.image_id == record.local_id) {
            planned.push(PlannedUpload {
                filename: record.filename.clone(),
                url: Some(target.url.clone()),
                bytes: record.bytes.clone(),
            });
        }
    }
    planned
}
