//! Zip pipeline tests against the on-disk blob store.
//!
//! Same worker path as `zip_pipeline_test`, but attachments and archives
//! live in a `FilesystemBlobStore` rooted in a temporary directory.

use std::io::{Cursor, Read};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use uuid::Uuid;
use zip::ZipArchive;

use notekeeper_core::{
    source_container_name, zip_container_name, BlobMetadata, BlobStore, Error, MessageQueue,
    ZipArchiveMetadata,
};
use notekeeper_jobs::{WorkerBuilder, WorkerConfig, WorkerEvent, ZipRequestProducer, ZipWorker};
use notekeeper_storage::{FilesystemBlobStore, InMemoryQueue};

struct Fixture {
    _dir: TempDir,
    blobs: Arc<FilesystemBlobStore>,
    queue: Arc<InMemoryQueue>,
    worker: ZipWorker,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let blobs = Arc::new(FilesystemBlobStore::new(dir.path()));
    let queue = Arc::new(InMemoryQueue::new("zips"));
    let worker = WorkerBuilder::new(queue.clone(), blobs.clone())
        .with_config(WorkerConfig::default().with_poll_interval(10))
        .build()
        .expect("default config is valid");
    Fixture {
        _dir: dir,
        blobs,
        queue,
        worker,
    }
}

async fn put_attachment(store: &FilesystemBlobStore, note_id: Uuid, name: &str, data: &[u8]) {
    store
        .put(
            &source_container_name(note_id),
            name,
            data.to_vec(),
            "text/plain",
            BlobMetadata::new(),
        )
        .await
        .expect("Failed to seed attachment");
}

async fn enqueue(queue: Arc<InMemoryQueue>, note_id: Uuid, zip_file_id: &str) {
    ZipRequestProducer::new(queue)
        .enqueue(note_id, zip_file_id)
        .await
        .expect("Failed to enqueue zip request");
}

async fn read_archive(store: &FilesystemBlobStore, note_id: Uuid, zip_file_id: &str) -> Vec<u8> {
    let mut stream = store
        .open_read(&zip_container_name(note_id), zip_file_id)
        .await
        .expect("archive uploaded");
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    bytes
}

fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

#[tokio::test]
async fn test_single_note_txt_archive_on_disk() {
    let fx = fixture();
    let note_id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
    put_attachment(&fx.blobs, note_id, "note.txt", b"helloworld").await;
    enqueue(fx.queue.clone(), note_id, "abc.zip").await;

    assert!(fx.worker.poll_once().await.unwrap());

    let bytes = read_archive(&fx.blobs, note_id, "abc.zip").await;
    assert_eq!(
        zip_entries(&bytes),
        vec![("note.txt".to_string(), b"helloworld".to_vec())]
    );

    let props = fx
        .blobs
        .properties("11111111-1111-1111-1111-111111111111-zip", "abc.zip")
        .await
        .unwrap()
        .expect("archive properties");
    assert_eq!(props.content_type, "application/zip");
    assert_eq!(props.content_length, bytes.len() as u64);
    let metadata = ZipArchiveMetadata::from_blob_metadata(&props.metadata).expect("zip metadata");
    assert_eq!(metadata.length, bytes.len() as u64);

    assert_eq!(fx.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_reprocessing_writes_identical_archive_on_disk() {
    let fx = fixture();
    let note_id = Uuid::new_v4();
    put_attachment(&fx.blobs, note_id, "a.txt", b"alpha").await;
    put_attachment(&fx.blobs, note_id, "dir/b.bin", &[0u8, 159, 146, 150]).await;

    enqueue(fx.queue.clone(), note_id, "all.zip").await;
    assert!(fx.worker.poll_once().await.unwrap());
    let first = read_archive(&fx.blobs, note_id, "all.zip").await;

    enqueue(fx.queue.clone(), note_id, "all.zip").await;
    assert!(fx.worker.poll_once().await.unwrap());
    let second = read_archive(&fx.blobs, note_id, "all.zip").await;

    assert_eq!(first, second);
    let items = fx
        .blobs
        .list(&zip_container_name(note_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(fx.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_damaged_attachment_uploads_nothing_and_keeps_message() {
    let fx = fixture();
    let note_id = Uuid::new_v4();
    for name in ["a.txt", "b.txt", "c.txt"] {
        put_attachment(&fx.blobs, note_id, name, b"some attachment bytes").await;
    }

    // Cut the tail off b.txt so its content no longer matches its header.
    let path = fx
        .blobs
        .record_path(&source_container_name(note_id), "b.txt")
        .unwrap();
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - 4).unwrap();

    enqueue(fx.queue.clone(), note_id, "abc.zip").await;
    let mut events = fx.worker.events();
    assert!(fx.worker.poll_once().await.unwrap());

    let uploaded = fx
        .blobs
        .list(&zip_container_name(note_id))
        .await
        .unwrap()
        .unwrap_or_default();
    assert!(uploaded.is_empty(), "no archive may be written");
    assert!(matches!(
        fx.blobs
            .open_read(&zip_container_name(note_id), "abc.zip")
            .await,
        Err(Error::NotFound(_))
    ));

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        if let WorkerEvent::MessageFailed { permanent, .. } = event {
            assert!(!permanent);
            failed = true;
        }
    }
    assert!(failed, "attempt should report a failure");
    assert_eq!(fx.queue.len().await.unwrap(), 1);
}
