//! File-backed job store persistence

mod common;

use std::sync::Arc;

use certwarden::jobs::{FileJobStore, JobStatus, JobStore, JobStoreError};

use common::{certificate, subject, Fixture};

#[tokio::test]
async fn test_jobs_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = FileJobStore::open(dir.path()).await.unwrap();
        store.create(&subject("a.example"), JobStatus::Queued).await.unwrap();
        store.create(&subject("b.example"), JobStatus::Queued).await.unwrap();
        store
            .set_status(&subject("a.example"), JobStatus::Uploaded)
            .await
            .unwrap();
    }

    let store = FileJobStore::open(dir.path()).await.unwrap();
    let a = store.find_by_subject(&subject("a.example")).await.unwrap().unwrap();
    assert_eq!(a.status, JobStatus::Uploaded);

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts[&JobStatus::Queued], 1);
    assert_eq!(counts[&JobStatus::Uploaded], 1);

    // Revisions continue past the reloaded ones
    let c = store.create(&subject("c.example"), JobStatus::Queued).await.unwrap();
    assert!(c.revision > a.revision);
}

#[tokio::test]
async fn test_one_file_per_subject() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileJobStore::open(dir.path()).await.unwrap();

    store
        .find_or_create(&subject("example.com"), JobStatus::Queued)
        .await
        .unwrap();
    store
        .find_or_create(&subject("Example.com."), JobStatus::Queued)
        .await
        .unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["example.com.json"]);

    let content = std::fs::read_to_string(dir.path().join("example.com.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["status"], "QUEUED");
    assert_eq!(value["subject"], "example.com");
}

#[tokio::test]
async fn test_duplicate_create_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileJobStore::open(dir.path()).await.unwrap();

    store.create(&subject("example.com"), JobStatus::Queued).await.unwrap();
    let err = store
        .create(&subject("example.com"), JobStatus::Queued)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::Duplicate(_)));
}

#[tokio::test]
async fn test_claims_are_ordered_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileJobStore::open(dir.path()).await.unwrap();

    for name in ["first.example", "second.example"] {
        store.create(&subject(name), JobStatus::Queued).await.unwrap();
    }

    let claimed = store
        .claim_oldest(JobStatus::Queued, JobStatus::Pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.subject, subject("first.example"));
    drop(store);

    let store = FileJobStore::open(dir.path()).await.unwrap();
    let pending = store.find_all_by_status(JobStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].subject, subject("first.example"));
}

#[tokio::test]
async fn test_failed_write_is_undone_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileJobStore::open(dir.path()).await.unwrap();
    store.create(&subject("a.example"), JobStatus::Queued).await.unwrap();

    // A directory where the temporary file goes makes every write fail
    let blocker = dir.path().join("a.example.json.tmp");
    std::fs::create_dir(&blocker).unwrap();

    let err = store
        .claim_oldest(JobStatus::Queued, JobStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::Io(_)));
    let job = store.find_by_subject(&subject("a.example")).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    assert!(store
        .set_status(&subject("a.example"), JobStatus::Failed)
        .await
        .is_err());
    assert!(store
        .find_or_create(&subject("a.example"), JobStatus::Created)
        .await
        .is_err());
    let job = store.find_by_subject(&subject("a.example")).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    std::fs::remove_dir(&blocker).unwrap();
    let claimed = store
        .claim_oldest(JobStatus::Queued, JobStatus::Pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.subject, subject("a.example"));

    let reopened = FileJobStore::open(dir.path()).await.unwrap();
    let job = reopened.find_by_subject(&subject("a.example")).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_failed_create_leaves_no_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileJobStore::open(dir.path()).await.unwrap();
    std::fs::create_dir(dir.path().join("b.example.json.tmp")).unwrap();

    assert!(store.create(&subject("b.example"), JobStatus::Queued).await.is_err());
    assert!(store.find_by_subject(&subject("b.example")).await.unwrap().is_none());
    let total: usize = store.count_by_status().await.unwrap().values().sum();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_guarded_write_skips_removed_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileJobStore::open(dir.path()).await.unwrap();
    store.create(&subject("a.example"), JobStatus::Removed).await.unwrap();

    let skipped = store
        .set_status_unless(&subject("a.example"), JobStatus::Failed, JobStatus::Removed)
        .await
        .unwrap();
    assert!(skipped.is_none());

    let reopened = FileJobStore::open(dir.path()).await.unwrap();
    let job = reopened.find_by_subject(&subject("a.example")).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Removed);
}

#[tokio::test]
async fn test_corrupt_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.example.json"), "{ not json").unwrap();

    let err = FileJobStore::open(dir.path()).await.unwrap_err();
    assert!(matches!(err, JobStoreError::Corrupt { .. }));
}

#[tokio::test]
async fn test_leftover_temp_files_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("example.com.json.tmp"), "{ partial").unwrap();

    let store = FileJobStore::open(dir.path()).await.unwrap();
    let total: usize = store.count_by_status().await.unwrap().values().sum();
    assert_eq!(total, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_restrictive_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs");
    let store = FileJobStore::open(&path).await.unwrap();
    store.create(&subject("example.com"), JobStatus::Queued).await.unwrap();

    let dir_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);

    let file_mode = std::fs::metadata(path.join("example.com.json"))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(file_mode, 0o600);
}

#[tokio::test]
async fn test_restart_resumes_from_disk() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = FileJobStore::open(dir.path()).await.unwrap();
        store
            .create(&subject("example.com"), JobStatus::Uploaded)
            .await
            .unwrap();
        store
            .create(&subject("queued.example"), JobStatus::Pending)
            .await
            .unwrap();
    }

    let store = Arc::new(FileJobStore::open(dir.path()).await.unwrap());
    let fixture = Fixture::with_jobs(5, store.clone());
    fixture.ca.store_certificate(certificate(&subject("example.com")));
    let h = fixture.start().await;

    assert_eq!(h.report.resumed_deployments, 1);
    assert_eq!(h.report.requeued_pending, 1);
    h.wait_for_status("example.com", JobStatus::Deployed).await;
    h.wait_for_status("queued.example", JobStatus::Pending).await;
    assert_eq!(h.cdn.created(), 0);

    let reopened = FileJobStore::open(dir.path()).await.unwrap();
    let job = reopened
        .find_by_subject(&subject("example.com"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Deployed);
}
