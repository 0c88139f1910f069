use stagedoor::lifecycle::{LifecycleError, TrackLifecycle};
use stagedoor::media::{MediaStore, SpooledUpload};
use stagedoor::store::models::{TrackStatus, UserAccount, UserQuota, ROLE_ARTIST};
use stagedoor::store::{MetaStore, QuotaLedger, StoreError, UserStore};
use tokio::io::AsyncWriteExt;

struct Stage {
    dir: tempfile::TempDir,
    meta: MetaStore,
    media: MediaStore,
    users: UserStore,
    lifecycle: TrackLifecycle,
}

async fn stage() -> Stage {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaStore::open(dir.path().join("data/meta")).await.unwrap();
    let users = UserStore::open(dir.path().join("users")).await.unwrap();
    let media = MediaStore::open(dir.path().join("data")).await.unwrap();
    let lifecycle = TrackLifecycle::new(meta.clone(), media.clone(), users.clone());
    Stage {
        dir,
        meta,
        media,
        users,
        lifecycle,
    }
}

async fn add_artist(stage: &Stage, username: &str, quota: UserQuota) {
    stage
        .users
        .put(&UserAccount {
            username: username.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            role: ROLE_ARTIST.to_string(),
            display_name: format!("{username}-display"),
            avatar: None,
            badges: Vec::new(),
            verified: false,
            quota,
        })
        .await
        .unwrap();
}

async fn spooled(stage: &Stage, contents: &[u8], name: &str, mime: &str) -> SpooledUpload {
    let (path, mut file) = stage.media.create_spool().await.unwrap();
    file.write_all(contents).await.unwrap();
    file.flush().await.unwrap();
    file.sync_all().await.unwrap();
    drop(file);
    SpooledUpload {
        path,
        original_file_name: name.to_string(),
        mime_type: mime.to_string(),
        size: contents.len() as u64,
    }
}

// ============================================================================
// submit
// ============================================================================

#[tokio::test]
async fn test_submit_creates_pending_record_and_binary() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "Demo.FLAC", "audio/flac").await;
    let spool_path = upload.path.clone();

    let record = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "Demo EP")
        .await
        .unwrap();

    assert_eq!(record.title, "Night Drive");
    assert_eq!(record.album, "Demo EP");
    assert_eq!(record.owner_id, "vera");
    assert_eq!(record.owner_display_name, "vera-display");
    assert_eq!(record.original_file_name, "Demo.FLAC");
    assert_eq!(record.mime_type, "audio/flac");
    assert_eq!(record.file_size, 10);
    assert_eq!(record.status, TrackStatus::Pending);
    assert_eq!(record.approved_location, None);

    // The binary left the spool area and is readable from the pending area
    let location = record.pending_location.as_deref().expect("pending location");
    assert!(location.contains("pending"));
    assert_eq!(tokio::fs::read(location).await.unwrap(), b"flac bytes");
    assert!(tokio::fs::metadata(&spool_path).await.is_err());

    // And the record round-trips through the store
    let stored = stage.meta.get(&record.id).await.unwrap();
    assert_eq!(stored.stored_file_name, record.stored_file_name);
}

#[tokio::test]
async fn test_submit_rejects_unsupported_media() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"mpeg4 video", "clip.mp4", "video/mp4").await;
    let spool_path = upload.path.clone();

    let result = stage.lifecycle.submit("vera", upload, "Clip", "").await;
    assert!(matches!(result, Err(LifecycleError::UnsupportedMedia(_))));

    // Nothing stuck: no record, no spool, no pending file
    assert!(stage.meta.list_all().await.unwrap().is_empty());
    assert!(tokio::fs::metadata(&spool_path).await.is_err());
    assert!(tokio::fs::metadata(stage.dir.path().join("data/pending/vera"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_submit_rejects_unknown_owner() {
    let stage = stage().await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let spool_path = upload.path.clone();

    let result = stage.lifecycle.submit("ghost", upload, "Echo", "").await;
    assert!(matches!(
        result,
        Err(LifecycleError::Store(StoreError::NotFound(_)))
    ));
    assert!(tokio::fs::metadata(&spool_path).await.is_err());
}

#[tokio::test]
async fn test_submit_enforces_pending_limit() {
    let stage = stage().await;
    add_artist(
        &stage,
        "vera",
        UserQuota {
            max_pending_tracks: 1,
            max_storage_mb: 2048,
        },
    )
    .await;

    let first = spooled(&stage, b"one", "one.flac", "audio/flac").await;
    stage.lifecycle.submit("vera", first, "One", "").await.unwrap();

    let second = spooled(&stage, b"two", "two.flac", "audio/flac").await;
    let spool_path = second.path.clone();
    let result = stage.lifecycle.submit("vera", second, "Two", "").await;

    match result {
        Err(LifecycleError::PendingQuotaExceeded { count, max }) => {
            assert_eq!(count, 1);
            assert_eq!(max, 1);
        }
        other => panic!("expected PendingQuotaExceeded, got {other:?}"),
    }

    // The rejected upload left no trace
    assert!(tokio::fs::metadata(&spool_path).await.is_err());
    assert_eq!(stage.meta.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_submit_enforces_storage_quota() {
    let stage = stage().await;
    add_artist(
        &stage,
        "vera",
        UserQuota {
            max_pending_tracks: 10,
            max_storage_mb: 0,
        },
    )
    .await;

    // Nothing stored yet, so usage does not exceed the zero quota
    let first = spooled(&stage, b"abc", "first.flac", "audio/flac").await;
    stage
        .lifecycle
        .submit("vera", first, "First", "")
        .await
        .unwrap();

    // Now the pending area holds bytes and the walk sees them
    let second = spooled(&stage, b"def", "second.flac", "audio/flac").await;
    let result = stage.lifecycle.submit("vera", second, "Second", "").await;
    match result {
        Err(LifecycleError::QuotaExceeded { used_mb, max_mb }) => {
            assert!(used_mb > 0.0);
            assert_eq!(max_mb, 0);
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }
}

// ============================================================================
// approve
// ============================================================================

#[tokio::test]
async fn test_approve_moves_binary_into_album_area() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "Demo EP")
        .await
        .unwrap();
    let pending_path = submitted.pending_location.clone().unwrap();

    let approved = stage.lifecycle.approve(&submitted.id, None).await.unwrap();

    assert_eq!(approved.status, TrackStatus::Approved);
    assert_eq!(approved.album, "Demo EP");
    assert_eq!(approved.pending_location, None);
    assert!(approved.updated_at >= submitted.updated_at);

    let location = approved.approved_location.as_deref().expect("approved location");
    let expected_name = format!("Night Drive-{}.flac", &approved.id[..8]);
    assert!(location.ends_with(&expected_name), "got {location}");
    assert!(location.contains("music"));
    assert!(location.contains("Demo EP"));

    // Bytes followed the move
    assert_eq!(tokio::fs::read(location).await.unwrap(), b"flac bytes");
    assert!(tokio::fs::metadata(&pending_path).await.is_err());

    // The rewritten record is what later readers see
    let stored = stage.meta.get(&approved.id).await.unwrap();
    assert_eq!(stored.status, TrackStatus::Approved);
    assert_eq!(stored.approved_location.as_deref(), Some(location));
}

#[tokio::test]
async fn test_approve_defaults_blank_album_to_singles() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();

    let approved = stage.lifecycle.approve(&submitted.id, None).await.unwrap();

    assert_eq!(approved.album, "Singles");
    let location = approved.approved_location.unwrap();
    assert!(location.contains("Singles"), "got {location}");
}

#[tokio::test]
async fn test_approve_dots_only_album_falls_back_to_singles() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "..")
        .await
        .unwrap();

    let approved = stage.lifecycle.approve(&submitted.id, None).await.unwrap();

    // A traversal album name must not climb out of the owner's music area
    let location = approved.approved_location.clone().unwrap();
    assert!(location.contains("music/vera/Singles"), "got {location}");
    assert!(!location.contains(".."), "got {location}");
    assert_eq!(tokio::fs::read(&location).await.unwrap(), b"flac bytes");

    // The published binary stays inside the area the quota walk covers
    let ledger = QuotaLedger::new(stage.meta.clone(), stage.media.clone());
    assert!(ledger.storage_used_mb("vera").await.unwrap() > 0.0);
}

#[tokio::test]
async fn test_approve_honors_album_override() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "Demo EP")
        .await
        .unwrap();

    let approved = stage
        .lifecycle
        .approve(&submitted.id, Some("Remaster Sessions"))
        .await
        .unwrap();

    assert_eq!(approved.album, "Remaster Sessions");
    let location = approved.approved_location.unwrap();
    assert!(location.contains("Remaster Sessions"), "got {location}");
}

#[tokio::test]
async fn test_approve_requires_pending_track() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();
    stage.lifecycle.approve(&submitted.id, None).await.unwrap();

    let again = stage.lifecycle.approve(&submitted.id, None).await;
    assert!(matches!(
        again,
        Err(LifecycleError::InvalidState {
            status: TrackStatus::Approved,
            ..
        })
    ));

    let unknown = stage.lifecycle.approve("no-such-id", None).await;
    assert!(matches!(unknown, Err(LifecycleError::NotFound(_))));
}

// ============================================================================
// reject
// ============================================================================

#[tokio::test]
async fn test_reject_removes_record_and_binary() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();
    let pending_path = submitted.pending_location.clone().unwrap();

    let rejected = stage.lifecycle.reject(&submitted.id).await.unwrap();
    assert_eq!(rejected.id, submitted.id);

    assert!(matches!(
        stage.meta.get(&submitted.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(tokio::fs::metadata(&pending_path).await.is_err());

    // A second reject observes the record as already gone
    let again = stage.lifecycle.reject(&submitted.id).await;
    assert!(matches!(again, Err(LifecycleError::NotFound(_))));
}

#[tokio::test]
async fn test_reject_requires_pending_track() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();
    stage.lifecycle.approve(&submitted.id, None).await.unwrap();

    let result = stage.lifecycle.reject(&submitted.id).await;
    assert!(matches!(
        result,
        Err(LifecycleError::InvalidState {
            status: TrackStatus::Approved,
            ..
        })
    ));
}

#[tokio::test]
async fn test_concurrent_approve_and_reject_have_one_winner() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();

    let approve = tokio::spawn({
        let lifecycle = stage.lifecycle.clone();
        let id = submitted.id.clone();
        async move { lifecycle.approve(&id, None).await }
    });
    let reject = tokio::spawn({
        let lifecycle = stage.lifecycle.clone();
        let id = submitted.id.clone();
        async move { lifecycle.reject(&id).await }
    });

    let approve = approve.await.unwrap();
    let reject = reject.await.unwrap();
    assert_eq!(
        approve.is_ok() as usize + reject.is_ok() as usize,
        1,
        "exactly one moderation action must win"
    );

    match approve {
        Ok(approved) => {
            // Approve won; reject saw a non-pending track
            assert!(matches!(reject, Err(LifecycleError::InvalidState { .. })));
            let stored = stage.meta.get(&approved.id).await.unwrap();
            assert_eq!(stored.status, TrackStatus::Approved);
            let location = stored.approved_location.unwrap();
            assert!(tokio::fs::metadata(&location).await.is_ok());
        }
        Err(e) => {
            // Reject won; approve found no record
            assert!(matches!(e, LifecycleError::NotFound(_)));
            assert!(matches!(
                stage.meta.get(&submitted.id).await,
                Err(StoreError::NotFound(_))
            ));
        }
    }
}

// ============================================================================
// reconcile
// ============================================================================

#[tokio::test]
async fn test_reconcile_completes_interrupted_approval() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;
    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let submitted = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();

    // Simulate a crash after the binary moved but before the record was
    // rewritten: the file sits at the derived approved path while the
    // record still says Pending.
    let pending_path = submitted.pending_location.clone().unwrap();
    let dest = stage
        .dir
        .path()
        .join("data/music/vera/Singles")
        .join(format!("Night Drive-{}.flac", &submitted.id[..8]));
    tokio::fs::create_dir_all(dest.parent().unwrap()).await.unwrap();
    tokio::fs::rename(&pending_path, &dest).await.unwrap();

    let report = stage.lifecycle.reconcile().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.repaired, 1);
    assert_eq!(report.missing, 0);

    let repaired = stage.meta.get(&submitted.id).await.unwrap();
    assert_eq!(repaired.status, TrackStatus::Approved);
    assert_eq!(repaired.album, "Singles");
    assert_eq!(repaired.pending_location, None);
    assert_eq!(
        repaired.approved_location.as_deref(),
        Some(dest.to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn test_reconcile_reports_missing_binaries() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;

    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let pending = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();
    tokio::fs::remove_file(pending.pending_location.as_deref().unwrap())
        .await
        .unwrap();

    let upload = spooled(&stage, b"wav bytes", "live.wav", "audio/wav").await;
    let approved = stage
        .lifecycle
        .submit("vera", upload, "Live Take", "")
        .await
        .unwrap();
    let approved = stage.lifecycle.approve(&approved.id, None).await.unwrap();
    tokio::fs::remove_file(approved.approved_location.as_deref().unwrap())
        .await
        .unwrap();

    let report = stage.lifecycle.reconcile().await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.repaired, 0);
    assert_eq!(report.missing, 2);

    // Unexplained absences are reported, never repaired by guesswork
    let untouched = stage.meta.get(&pending.id).await.unwrap();
    assert_eq!(untouched.status, TrackStatus::Pending);
}

#[tokio::test]
async fn test_reconcile_leaves_healthy_records_alone() {
    let stage = stage().await;
    add_artist(&stage, "vera", UserQuota::default()).await;

    let upload = spooled(&stage, b"flac bytes", "demo.flac", "audio/flac").await;
    let pending = stage
        .lifecycle
        .submit("vera", upload, "Night Drive", "")
        .await
        .unwrap();

    let upload = spooled(&stage, b"wav bytes", "live.wav", "audio/wav").await;
    let approved = stage
        .lifecycle
        .submit("vera", upload, "Live Take", "")
        .await
        .unwrap();
    stage.lifecycle.approve(&approved.id, None).await.unwrap();

    let report = stage.lifecycle.reconcile().await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.repaired, 0);
    assert_eq!(report.missing, 0);

    let still_pending = stage.meta.get(&pending.id).await.unwrap();
    assert_eq!(still_pending.status, TrackStatus::Pending);
}
