use super::*;
use async_trait::async_trait;
use shared::protocol::{GENERIC_FAILURE_MESSAGE, TIMEOUT_FAILURE_MESSAGE};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

const PNG_PREFIX: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

struct CannedProcessor {
    outcome: Result<ProcessedImage, ProcessError>,
    calls: AtomicUsize,
}

impl CannedProcessor {
    fn ok(bytes: &[u8]) -> Self {
        Self {
            outcome: Ok(ProcessedImage::new(bytes.to_vec(), Some("image/png".into()))),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(err: ProcessError) -> Self {
        Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteProcessor for CannedProcessor {
    async fn remove_background(
        &self,
        _image: &SelectedImage,
    ) -> Result<ProcessedImage, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

fn cat() -> SelectedImage {
    SelectedImage::new("cat.jpg", b"jpeg-bytes".to_vec()).expect("valid image")
}

fn dog() -> SelectedImage {
    SelectedImage::new("dog.png", b"png-bytes".to_vec()).expect("valid image")
}

fn assert_exclusive(workflow: &ImageWorkflow) {
    assert!(
        !(workflow.processed().is_some() && workflow.error_message().is_some()),
        "result and error must never coexist (status {:?})",
        workflow.status()
    );
}

#[test]
fn starts_idle_with_nothing_held() {
    let workflow = ImageWorkflow::new();
    assert_eq!(workflow.status(), WorkflowStatus::Idle);
    assert!(workflow.selected().is_none());
    assert!(workflow.processed().is_none());
    assert!(workflow.error_message().is_none());
    assert!(!workflow.can_submit());
}

#[test]
fn selected_image_guesses_mime_from_extension() {
    assert_eq!(cat().mime_type(), "image/jpeg");
    assert_eq!(dog().mime_type(), "image/png");
}

#[test]
fn rejects_non_image_empty_and_oversized_files() {
    let err = SelectedImage::new("notes.txt", b"hello".to_vec()).expect_err("text file");
    assert!(matches!(err, WorkflowError::InvalidImage(_)));

    let err = SelectedImage::new("cat.png", Vec::new()).expect_err("empty file");
    assert!(matches!(err, WorkflowError::InvalidImage(_)));

    let err = SelectedImage::new("huge.png", vec![0u8; MAX_IMAGE_BYTES + 1])
        .expect_err("oversized file");
    assert!(matches!(err, WorkflowError::InvalidImage(_)));

    SelectedImage::new("limit.png", vec![0u8; MAX_IMAGE_BYTES]).expect("exactly at limit");
}

#[test]
fn loads_selected_image_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("photo.jpeg");
    fs::write(&path, b"jpeg").expect("write");

    let image = SelectedImage::load(&path).expect("load");
    assert_eq!(image.file_name(), "photo.jpeg");
    assert_eq!(image.bytes().as_ref(), b"jpeg");

    let missing = SelectedImage::load(&dir.path().join("missing.png")).expect_err("missing");
    assert!(matches!(missing, WorkflowError::InvalidImage(_)));
}

#[tokio::test]
async fn successful_submit_stores_processed_bytes() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());
    assert_eq!(workflow.status(), WorkflowStatus::ImageSelected);

    let processor = CannedProcessor::ok(&PNG_PREFIX);
    let completion = workflow.process_with(&processor).await.expect("submit");

    assert_eq!(completion, Completion::Applied(WorkflowStatus::Succeeded));
    assert_eq!(workflow.status(), WorkflowStatus::Succeeded);
    assert_eq!(
        workflow.processed().expect("result").bytes().as_ref(),
        PNG_PREFIX
    );
    assert!(workflow.error_message().is_none());
    assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_submit_surfaces_processor_message_verbatim() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());

    let processor = CannedProcessor::failing(ProcessError::Rejected {
        status: 500,
        message: "unsupported format".into(),
    });
    workflow.process_with(&processor).await.expect("submit");

    assert_eq!(workflow.status(), WorkflowStatus::Failed);
    assert_eq!(workflow.error_message(), Some("unsupported format"));
    let failure = workflow.failure().expect("failure");
    assert_eq!(failure.kind, FailureKind::Processing);
    assert!(workflow.processed().is_none());
}

#[tokio::test]
async fn transport_failure_uses_generic_message() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());

    let processor = CannedProcessor::failing(ProcessError::Transport("connection refused".into()));
    workflow.process_with(&processor).await.expect("submit");

    assert_eq!(workflow.status(), WorkflowStatus::Failed);
    assert_eq!(workflow.error_message(), Some(GENERIC_FAILURE_MESSAGE));
    assert_eq!(workflow.failure().expect("failure").kind, FailureKind::Upload);
}

#[tokio::test]
async fn timeout_maps_to_timeout_failure_kind() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());

    let processor = CannedProcessor::failing(ProcessError::Timeout(Duration::from_secs(60)));
    workflow.process_with(&processor).await.expect("submit");

    let failure = workflow.failure().expect("failure");
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.message, TIMEOUT_FAILURE_MESSAGE);
}

#[test]
fn reset_while_processing_discards_late_response() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());
    let ticket = workflow.submit().expect("submit");
    assert_eq!(workflow.status(), WorkflowStatus::Processing);

    workflow.reset();
    let completion = workflow.complete(
        ticket.generation,
        Ok(ProcessedImage::new(PNG_PREFIX.to_vec(), None)),
    );

    assert_eq!(completion, Completion::Discarded);
    assert_eq!(workflow.status(), WorkflowStatus::Idle);
    assert!(workflow.processed().is_none());
}

#[test]
fn new_selection_while_processing_discards_late_response() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());
    let ticket = workflow.submit().expect("submit");

    workflow.select(dog());
    let completion = workflow.complete(
        ticket.generation,
        Err(ProcessError::Rejected {
            status: 500,
            message: "late failure".into(),
        }),
    );

    assert_eq!(completion, Completion::Discarded);
    assert_eq!(workflow.status(), WorkflowStatus::ImageSelected);
    assert_eq!(workflow.selected().expect("selection").file_name(), "dog.png");
    assert!(workflow.error_message().is_none());
}

#[test]
fn outcome_of_an_earlier_submit_is_not_applied_to_a_retry() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());
    let first = workflow.submit().expect("first submit");
    workflow.complete(first.generation, Err(ProcessError::EmptyResponse));
    assert_eq!(workflow.status(), WorkflowStatus::Failed);

    let retry = workflow.submit().expect("retry");
    assert_eq!(
        workflow.complete(first.generation, Ok(ProcessedImage::new(vec![1], None))),
        Completion::Discarded
    );
    assert_eq!(workflow.status(), WorkflowStatus::Processing);

    assert_eq!(
        workflow.complete(retry.generation, Ok(ProcessedImage::new(vec![2], None))),
        Completion::Applied(WorkflowStatus::Succeeded)
    );
    assert_eq!(workflow.processed().expect("result").bytes().as_ref(), [2u8]);
}

#[test]
fn second_submit_while_processing_is_rejected() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());
    let ticket = workflow.submit().expect("submit");
    let generation = workflow.generation();

    assert_eq!(
        workflow.submit().expect_err("in flight"),
        WorkflowError::AlreadyProcessing
    );
    assert_eq!(workflow.generation(), generation);
    assert_eq!(ticket.generation, generation);
    assert!(!workflow.can_submit());
}

#[test]
fn resubmitting_after_success_replaces_the_result() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());
    let first = workflow.submit().expect("submit");
    workflow.complete(first.generation, Ok(ProcessedImage::new(vec![1], None)));
    assert!(workflow.can_submit());

    let again = workflow.submit().expect("resubmit");
    assert_ne!(again.generation, first.generation);
    assert_eq!(again.image.file_name(), "cat.jpg");
    assert_eq!(workflow.status(), WorkflowStatus::Processing);
    assert!(workflow.processed().is_none());

    assert_eq!(
        workflow.complete(again.generation, Ok(ProcessedImage::new(vec![2], None))),
        Completion::Applied(WorkflowStatus::Succeeded)
    );
    assert_eq!(workflow.processed().expect("result").bytes().as_ref(), [2u8]);
}

#[test]
fn submit_without_selection_is_rejected() {
    let mut workflow = ImageWorkflow::new();
    assert_eq!(
        workflow.submit().expect_err("idle"),
        WorkflowError::NoImageSelected
    );
    assert_eq!(workflow.status(), WorkflowStatus::Idle);
}

#[test]
fn selecting_after_success_or_failure_clears_outcome() {
    let mut workflow = ImageWorkflow::new();
    workflow.select(cat());
    let ticket = workflow.submit().expect("submit");
    workflow.complete(ticket.generation, Ok(ProcessedImage::new(vec![7], None)));
    assert_eq!(workflow.status(), WorkflowStatus::Succeeded);

    workflow.select(dog());
    assert_eq!(workflow.status(), WorkflowStatus::ImageSelected);
    assert!(workflow.processed().is_none());
    assert!(workflow.error_message().is_none());

    let ticket = workflow.submit().expect("submit");
    workflow.complete(ticket.generation, Err(ProcessError::Transport("down".into())));
    assert_eq!(workflow.status(), WorkflowStatus::Failed);

    workflow.select(cat());
    assert_eq!(workflow.status(), WorkflowStatus::ImageSelected);
    assert!(workflow.processed().is_none());
    assert!(workflow.error_message().is_none());
}

#[test]
fn reset_from_every_state_returns_to_idle() {
    let mut builds: Vec<Box<dyn Fn() -> ImageWorkflow>> = Vec::new();
    builds.push(Box::new(ImageWorkflow::new));
    builds.push(Box::new(|| {
        let mut workflow = ImageWorkflow::new();
        workflow.select(cat());
        workflow
    }));
    builds.push(Box::new(|| {
        let mut workflow = ImageWorkflow::new();
        workflow.select(cat());
        workflow.submit().expect("submit");
        workflow
    }));
    builds.push(Box::new(|| {
        let mut workflow = ImageWorkflow::new();
        workflow.select(cat());
        let ticket = workflow.submit().expect("submit");
        workflow.complete(ticket.generation, Ok(ProcessedImage::new(vec![1], None)));
        workflow
    }));
    builds.push(Box::new(|| {
        let mut workflow = ImageWorkflow::new();
        workflow.select(cat());
        let ticket = workflow.submit().expect("submit");
        workflow.complete(ticket.generation, Err(ProcessError::EmptyResponse));
        workflow
    }));

    for build in builds {
        let mut workflow = build();
        let before = workflow.generation();
        workflow.reset();
        assert_eq!(workflow.status(), WorkflowStatus::Idle);
        assert!(workflow.selected().is_none());
        assert!(workflow.processed().is_none());
        assert!(workflow.error_message().is_none());
        assert!(workflow.generation() > before);
    }
}

#[test]
fn download_is_only_available_after_success() {
    let mut workflow = ImageWorkflow::new();
    assert_eq!(
        workflow.download().expect_err("idle"),
        WorkflowError::NothingToDownload
    );

    workflow.select(cat());
    assert!(workflow.download().is_err());

    let ticket = workflow.submit().expect("submit");
    assert!(workflow.download().is_err());

    workflow.complete(ticket.generation, Ok(ProcessedImage::new(PNG_PREFIX.to_vec(), None)));
    let download = workflow.download().expect("download");
    assert_eq!(download.file_name, DOWNLOAD_FILE_NAME);
    assert_eq!(download.bytes, PNG_PREFIX);

    let dir = tempfile::tempdir().expect("tempdir");
    let saved = download.save_into(dir.path()).expect("save");
    assert_eq!(saved, dir.path().join("background-removed.png"));
    assert_eq!(fs::read(saved).expect("read"), PNG_PREFIX);
}

#[tokio::test]
async fn result_and_error_never_coexist_across_a_session() {
    let ok = CannedProcessor::ok(&PNG_PREFIX);
    let failing = CannedProcessor::failing(ProcessError::Rejected {
        status: 422,
        message: "bad".into(),
    });
    let mut workflow = ImageWorkflow::new();

    assert_exclusive(&workflow);
    workflow.select(cat());
    assert_exclusive(&workflow);
    workflow.process_with(&ok).await.expect("ok");
    assert_exclusive(&workflow);
    workflow.process_with(&failing).await.expect("failing");
    assert_exclusive(&workflow);
    assert_eq!(workflow.status(), WorkflowStatus::Failed);
    workflow.process_with(&ok).await.expect("retry");
    assert_exclusive(&workflow);
    assert_eq!(workflow.status(), WorkflowStatus::Succeeded);
    workflow.reset();
    assert_exclusive(&workflow);
}
