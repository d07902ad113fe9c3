//! End-to-end compose/edit sessions against in-memory API and storage fakes.
//!
//! Exercises: ComposeSession::open, add/edit/delete, submit (create + edit),
//! upload target matching, per-image upload outcomes, duplicate-submit
//! guard and SharedSession hand-off.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use waffly::posts::schema::{
    BoardResponse, EditPostRequest, ImageResponse, PostRequest, PostResponse,
};
use waffly::posts::{
    ComposeSession, ImageTransport, PostApi, PostDraft, PostError, SessionLimits, SharedSession,
    SubmitError, TransportError,
};

#[derive(Default)]
struct FakeBackend {
    posts: Mutex<HashMap<i64, PostResponse>>,
    created: Mutex<Vec<PostRequest>>,
    edited: Mutex<Vec<EditPostRequest>>,
    reject_submit: bool,
}

fn presign(kind: &str, filename: &str) -> String {
    format!("https://bucket.example.com/{kind}/{filename}")
}

#[async_trait]
impl PostApi for FakeBackend {
    async fn get_board(&self, board_id: i64) -> Result<BoardResponse, SubmitError> {
        if board_id != 1 {
            return Err(SubmitError::Rejected {
                status: 404,
                error_code: Some("BOARD_NOT_FOUND".into()),
                message: None,
            });
        }
        Ok(BoardResponse {
            board_id,
            title: "free".into(),
            description: None,
            allow_anonymous: true,
        })
    }

    async fn get_post(&self, _board_id: i64, post_id: i64) -> Result<PostResponse, SubmitError> {
        self.posts
            .lock()
            .get(&post_id)
            .cloned()
            .ok_or(SubmitError::Rejected {
                status: 404,
                error_code: None,
                message: Some("no such post".into()),
            })
    }

    async fn create_post(
        &self,
        board_id: i64,
        request: &PostRequest,
    ) -> Result<PostResponse, SubmitError> {
        if self.reject_submit {
            return Err(SubmitError::Rejected {
                status: 400,
                error_code: Some("2001".into()),
                message: Some("contents required".into()),
            });
        }
        self.created.lock().push(request.clone());
        // Backend keeps the client's ids on create and presigns every image.
        let images = request.images.as_ref().map(|images| {
            images
                .iter()
                .map(|i| ImageResponse {
                    image_id: i.image_id,
                    filename: i.file_name.clone(),
                    description: Some(i.description.clone()),
                    pre_signed_url: Some(presign("put", &i.file_name)),
                })
                .collect()
        });
        Ok(PostResponse {
            post_id: 100,
            board_id,
            title: request.title.clone(),
            contents: request.contents.clone(),
            is_question: request.is_question,
            is_writer_anonymous: request.is_anonymous,
            images,
        })
    }

    async fn edit_post(
        &self,
        board_id: i64,
        post_id: i64,
        request: &EditPostRequest,
    ) -> Result<PostResponse, SubmitError> {
        self.edited.lock().push(request.clone());
        // Backend reassigns ids on edit; only images it has no bytes for get a URL.
        let images = request.images.as_ref().map(|images| {
            images
                .iter()
                .enumerate()
                .map(|(n, i)| ImageResponse {
                    image_id: 500 + n as i64,
                    filename: i.file_name.clone(),
                    description: Some(i.description.clone()),
                    pre_signed_url: i
                        .file_name
                        .starts_with("new")
                        .then(|| presign("put", &i.file_name)),
                })
                .collect()
        });
        Ok(PostResponse {
            post_id,
            board_id,
            title: request.title.clone(),
            contents: request.contents.clone(),
            is_question: request.is_question,
            is_writer_anonymous: request.is_writer_anonymous,
            images,
        })
    }
}

#[derive(Default)]
struct FakeStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    broken_uploads: Vec<String>,
}

#[async_trait]
impl ImageTransport for FakeStorage {
    async fn fetch(&self, url: &str) -> Result<Bytes, TransportError> {
        self.objects
            .lock()
            .get(url)
            .cloned()
            .ok_or(TransportError::Status {
                status: 404,
                body: "NoSuchKey".into(),
            })
    }

    async fn upload(&self, url: &str, bytes: Bytes) -> Result<(), TransportError> {
        if self.broken_uploads.iter().any(|u| u == url) {
            return Err(TransportError::Status {
                status: 403,
                body: "SignatureDoesNotMatch".into(),
            });
        }
        self.objects.lock().insert(url.to_string(), bytes);
        Ok(())
    }
}

fn existing_post() -> PostResponse {
    PostResponse {
        post_id: 7,
        board_id: 1,
        title: Some("lost umbrella".into()),
        contents: "found near library".into(),
        is_question: true,
        is_writer_anonymous: true,
        images: Some(vec![
            ImageResponse {
                image_id: 3,
                filename: "front.jpg".into(),
                description: Some("front".into()),
                pre_signed_url: Some(presign("get", "front.jpg")),
            },
            ImageResponse {
                image_id: 4,
                filename: "back.jpg".into(),
                description: None,
                pre_signed_url: Some(presign("get", "back.jpg")),
            },
        ]),
    }
}

fn seeded_storage() -> FakeStorage {
    let storage = FakeStorage::default();
    {
        let mut objects = storage.objects.lock();
        objects.insert(presign("get", "front.jpg"), Bytes::from_static(b"FRONT"));
        objects.insert(presign("get", "back.jpg"), Bytes::from_static(b"BACK"));
    }
    storage
}

fn backend_with_post() -> FakeBackend {
    let backend = FakeBackend::default();
    backend.posts.lock().insert(7, existing_post());
    backend
}

#[tokio::test]
async fn create_flow_uploads_every_image() {
    let backend = Arc::new(FakeBackend::default());
    let storage = Arc::new(FakeStorage::default());
    let mut session = ComposeSession::open(
        backend.clone(),
        storage.clone(),
        SessionLimits::default(),
        1,
        None,
    )
    .await
    .unwrap();
    assert!(!session.is_edit());

    session.add_image("a.png", Bytes::from_static(b"A")).unwrap();
    session.add_image("b.png", Bytes::from_static(b"B")).unwrap();
    session.edit_description(1, "b.png", "second");

    let report = session
        .submit(PostDraft {
            title: Some("hello".into()),
            contents: "two pictures".into(),
            is_question: false,
            is_anonymous: true,
        })
        .await
        .unwrap();

    assert_eq!(report.post.post_id, 100);
    assert_eq!(report.uploads.len(), 2);
    assert!(report.uploads.iter().all(|o| o.is_success()));

    let created = backend.created.lock();
    let images = created[0].images.as_ref().unwrap();
    assert_eq!(images[1].image_id, 1);
    assert_eq!(images[1].description, "second");

    let objects = storage.objects.lock();
    assert_eq!(objects[&presign("put", "a.png")], Bytes::from_static(b"A"));
    assert_eq!(objects[&presign("put", "b.png")], Bytes::from_static(b"B"));
}

#[tokio::test]
async fn create_without_images_omits_field_and_skips_uploads() {
    let backend = Arc::new(FakeBackend::default());
    let mut session = ComposeSession::open(
        backend.clone(),
        Arc::new(FakeStorage::default()),
        SessionLimits::default(),
        1,
        None,
    )
    .await
    .unwrap();

    let report = session
        .submit(PostDraft {
            contents: "text only".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.uploads.is_empty());
    assert!(backend.created.lock()[0].images.is_none());
}

#[tokio::test]
async fn edit_flow_deletes_by_filename_and_uploads_only_new_images() {
    let backend = Arc::new(backend_with_post());
    let storage = Arc::new(seeded_storage());
    let mut session = ComposeSession::open(
        backend.clone(),
        storage.clone(),
        SessionLimits::default(),
        1,
        Some(7),
    )
    .await
    .unwrap();

    assert!(session.is_edit());
    assert_eq!(session.working().len(), 2);
    assert_eq!(session.working().records()[1].bytes, Bytes::from_static(b"BACK"));

    session.delete_image(4, "back.jpg");
    session.add_image("new-side.jpg", Bytes::from_static(b"SIDE")).unwrap();
    assert_eq!(session.working().records()[1].local_id, 5);

    let report = session
        .submit(PostDraft {
            title: Some("lost umbrella (blue)".into()),
            contents: "found near library, 2F".into(),
            // Ignored on edit: flags come from the original post.
            is_question: false,
            is_anonymous: false,
        })
        .await
        .unwrap();

    let edited = backend.edited.lock();
    let request = &edited[0];
    assert_eq!(request.deleted_images, Some(vec!["back.jpg".to_string()]));
    assert!(request.is_question);
    assert!(request.is_writer_anonymous);
    let filenames: Vec<&str> = request
        .images
        .as_ref()
        .unwrap()
        .iter()
        .map(|i| i.file_name.as_str())
        .collect();
    assert_eq!(filenames, vec!["front.jpg", "new-side.jpg"]);

    assert_eq!(report.uploads.len(), 1);
    assert_eq!(report.uploads[0].filename, "new-side.jpg");
    assert!(report.uploads[0].is_success());
    assert_eq!(
        storage.objects.lock()[&presign("put", "new-side.jpg")],
        Bytes::from_static(b"SIDE")
    );
}

#[tokio::test]
async fn edit_flow_with_unchanged_images_sends_no_deletions() {
    let backend = Arc::new(backend_with_post());
    let mut session = ComposeSession::open(
        backend.clone(),
        Arc::new(seeded_storage()),
        SessionLimits::default(),
        1,
        Some(7),
    )
    .await
    .unwrap();

    let report = session
        .submit(PostDraft {
            contents: "same pictures".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.uploads.is_empty());
    assert!(backend.edited.lock()[0].deleted_images.is_none());
}

#[tokio::test]
async fn failed_image_load_aborts_open() {
    let backend = Arc::new(backend_with_post());
    let storage = FakeStorage::default();
    storage
        .objects
        .lock()
        .insert(presign("get", "front.jpg"), Bytes::from_static(b"FRONT"));

    let result = ComposeSession::open(
        backend,
        Arc::new(storage),
        SessionLimits::default(),
        1,
        Some(7),
    )
    .await;

    match result {
        Err(PostError::ImageLoadFailure { filename, source }) => {
            assert_eq!(filename, "back.jpg");
            assert!(matches!(source, TransportError::Status { status: 404, .. }));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("open should fail when an image cannot be loaded"),
    }
}

#[tokio::test]
async fn unknown_board_and_post_are_reported() {
    let result = ComposeSession::open(
        Arc::new(FakeBackend::default()),
        Arc::new(FakeStorage::default()),
        SessionLimits::default(),
        2,
        None,
    )
    .await;
    assert!(matches!(
        result,
        Err(PostError::BoardLoadFailure { board_id: 2, .. })
    ));

    let result = ComposeSession::open(
        Arc::new(FakeBackend::default()),
        Arc::new(FakeStorage::default()),
        SessionLimits::default(),
        1,
        Some(99),
    )
    .await;
    assert!(matches!(
        result,
        Err(PostError::PostLoadFailure { post_id: 99, .. })
    ));
}

#[tokio::test]
async fn rejected_submit_carries_backend_details() {
    let backend = Arc::new(FakeBackend {
        reject_submit: true,
        ..Default::default()
    });
    let mut session = ComposeSession::open(
        backend,
        Arc::new(FakeStorage::default()),
        SessionLimits::default(),
        1,
        None,
    )
    .await
    .unwrap();

    let err = session.submit(PostDraft::default()).await.unwrap_err();
    match err {
        PostError::SubmitFailure(SubmitError::Rejected {
            status,
            error_code,
            message,
        }) => {
            assert_eq!(status, 400);
            assert_eq!(error_code.as_deref(), Some("2001"));
            assert_eq!(message.as_deref(), Some("contents required"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn one_broken_upload_does_not_stop_the_rest() {
    let backend = Arc::new(FakeBackend::default());
    let storage = Arc::new(FakeStorage {
        broken_uploads: vec![presign("put", "b.png")],
        ..Default::default()
    });
    let mut session = ComposeSession::open(
        backend,
        storage.clone(),
        SessionLimits {
            fetch_concurrency: 1,
            upload_concurrency: 3,
        },
        1,
        None,
    )
    .await
    .unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        session
            .add_image(name, Bytes::from(name.as_bytes().to_vec()))
            .unwrap();
    }

    let report = session
        .submit(PostDraft {
            contents: "three".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.uploads.len(), 3);
    let failed: Vec<&str> = report.failed_uploads().map(|o| o.filename.as_str()).collect();
    assert_eq!(failed, vec!["b.png"]);
    assert_eq!(storage.objects.lock().len(), 2);
}

#[tokio::test]
async fn second_submit_after_success_is_refused() {
    let backend = Arc::new(FakeBackend::default());
    let mut session = ComposeSession::open(
        backend.clone(),
        Arc::new(FakeStorage::default()),
        SessionLimits::default(),
        1,
        None,
    )
    .await
    .unwrap();

    session
        .submit(PostDraft {
            contents: "once".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(session.submitted_post(), Some(100));

    let err = session
        .submit(PostDraft {
            contents: "twice".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PostError::AlreadySubmitted { post_id: 100 }));
    assert_eq!(backend.created.lock().len(), 1);
}

#[tokio::test]
async fn rejected_submit_can_be_retried() {
    let backend = Arc::new(FakeBackend {
        reject_submit: true,
        ..Default::default()
    });
    let mut session = ComposeSession::open(
        backend,
        Arc::new(FakeStorage::default()),
        SessionLimits::default(),
        1,
        None,
    )
    .await
    .unwrap();

    for _ in 0..2 {
        let err = session.submit(PostDraft::default()).await.unwrap_err();
        assert!(matches!(err, PostError::SubmitFailure(_)));
    }
    assert_eq!(session.submitted_post(), None);
}

#[tokio::test]
async fn shared_edits_are_submitted() {
    let backend = Arc::new(backend_with_post());
    let storage = Arc::new(seeded_storage());
    let mut session = ComposeSession::open(
        backend.clone(),
        storage.clone(),
        SessionLimits::default(),
        1,
        Some(7),
    )
    .await
    .unwrap();

    let shared: SharedSession = session.share();
    let tasks: Vec<_> = ["new-a.jpg", "new-b.jpg"]
        .into_iter()
        .map(|name| {
            let shared = shared.clone();
            tokio::spawn(async move {
                shared
                    .add_image(name, Bytes::from(name.as_bytes().to_vec()))
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    shared.delete_image(3, "front.jpg");

    let adopted = session.adopt_shared(&shared);
    let ids: Vec<i64> = adopted.records().iter().map(|r| r.local_id).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], 4);
    let mut new_ids = ids[1..].to_vec();
    new_ids.sort();
    assert_eq!(new_ids, vec![5, 6]);

    let report = session
        .submit(PostDraft {
            contents: "more angles".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let edited = backend.edited.lock();
    assert_eq!(edited[0].deleted_images, Some(vec!["front.jpg".to_string()]));
    assert_eq!(report.uploads.len(), 2);
    assert!(report.uploads.iter().all(|o| o.is_success()));
}
