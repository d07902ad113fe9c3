use serde::{Deserialize, Serialize};

/// Image metadata sent with a create/edit request (not the image bytes themselves).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    #[serde(rename = "imageId")]
    pub image_id: i64,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub description: String,
}

/// Body of `POST /api/board/{boardId}/post`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub contents: String,
    pub is_question: bool,
    pub is_anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRequest>>,
}

/// Body of `PUT /api/board/{boardId}/post/{postId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub contents: String,
    pub is_question: bool,
    pub is_writer_anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_images: Option<Vec<String>>,
}

/// One image as reported by the backend.
///
/// `pre_signed_url` is a download URL when reading a post and an upload
/// target after a create/edit, present only for images that still need bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_id: i64,
    pub filename: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pre_signed_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub post_id: i64,
    pub board_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub contents: String,
    #[serde(default)]
    pub is_question: bool,
    #[serde(default)]
    pub is_writer_anonymous: bool,
    #[serde(default)]
    pub images: Option<Vec<ImageResponse>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardResponse {
    pub board_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub allow_anonymous: bool,
}
