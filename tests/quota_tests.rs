use chrono::Utc;
use stagedoor::media::MediaStore;
use stagedoor::store::models::{TrackRecord, TrackStatus};
use stagedoor::store::{MetaStore, QuotaLedger};

async fn test_ledger() -> (tempfile::TempDir, MetaStore, QuotaLedger) {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaStore::open(dir.path().join("data/meta")).await.unwrap();
    let media = MediaStore::open(dir.path().join("data")).await.unwrap();
    let ledger = QuotaLedger::new(meta.clone(), media);
    (dir, meta, ledger)
}

async fn plant_file(dir: &tempfile::TempDir, rel: &str, len: usize) {
    let path = dir.path().join("data").join(rel);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(path, vec![0u8; len]).await.unwrap();
}

fn pending_record(id: &str, owner: &str) -> TrackRecord {
    let now = Utc::now();
    TrackRecord {
        id: id.to_string(),
        title: "Untitled".to_string(),
        album: String::new(),
        owner_id: owner.to_string(),
        owner_display_name: owner.to_string(),
        original_file_name: "demo.flac".to_string(),
        stored_file_name: "demo.flac".to_string(),
        pending_location: Some(format!("/data/pending/{owner}/demo.flac")),
        approved_location: None,
        mime_type: "audio/flac".to_string(),
        file_size: 1024,
        status: TrackStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_storage_sums_pending_and_approved_areas() {
    let (dir, _meta, ledger) = test_ledger().await;
    plant_file(&dir, "pending/vera/a.flac", 1024 * 1024).await;
    plant_file(&dir, "music/vera/Singles/b.flac", 512 * 1024).await;

    let used = ledger.storage_used_mb("vera").await.unwrap();
    assert!((used - 1.5).abs() < 1e-9, "got {used}");
}

#[tokio::test]
async fn test_storage_ignores_other_users_and_spools() {
    let (dir, _meta, ledger) = test_ledger().await;
    plant_file(&dir, "pending/vera/a.flac", 1024 * 1024).await;
    plant_file(&dir, "pending/miles/other.flac", 1024 * 1024).await;
    plant_file(&dir, "tmp/.upload-inflight", 1024 * 1024).await;

    let used = ledger.storage_used_mb("vera").await.unwrap();
    assert!((used - 1.0).abs() < 1e-9, "got {used}");
}

#[tokio::test]
async fn test_storage_of_unknown_user_is_zero() {
    let (_dir, _meta, ledger) = test_ledger().await;
    let used = ledger.storage_used_mb("nobody").await.unwrap();
    assert_eq!(used, 0.0);
}

#[tokio::test]
async fn test_storage_walks_nested_album_directories() {
    let (dir, _meta, ledger) = test_ledger().await;
    plant_file(&dir, "music/vera/Demo EP/one.flac", 256 * 1024).await;
    plant_file(&dir, "music/vera/Live/Night One/two.flac", 256 * 1024).await;

    let used = ledger.storage_used_mb("vera").await.unwrap();
    assert!((used - 0.5).abs() < 1e-9, "got {used}");
}

#[tokio::test]
async fn test_pending_count_is_per_owner_and_status() {
    let (_dir, meta, ledger) = test_ledger().await;

    meta.put(&pending_record("t1", "vera")).await.unwrap();
    meta.put(&pending_record("t2", "vera")).await.unwrap();
    meta.put(&pending_record("t3", "miles")).await.unwrap();

    let mut published = pending_record("t4", "vera");
    published.status = TrackStatus::Approved;
    published.pending_location = None;
    published.approved_location = Some("/data/music/vera/Singles/x.flac".to_string());
    meta.put(&published).await.unwrap();

    assert_eq!(ledger.pending_count("vera").await.unwrap(), 2);
    assert_eq!(ledger.pending_count("miles").await.unwrap(), 1);
    assert_eq!(ledger.pending_count("nobody").await.unwrap(), 0);
}
