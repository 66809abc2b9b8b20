// Integration tests for threshold persistence
//
// These tests verify the JSON store keeps the original file layout, rejects
// out-of-range writes before touching disk, and survives a reopen.

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use voice_warden::{
    GroupId, JsonThresholdStore, MemoryThresholdStore, ModerationError, Threshold, ThresholdStore,
};

#[tokio::test]
async fn test_missing_file_is_created_empty() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("data").join("thresholds.json");

    let store = JsonThresholdStore::open(&path).await?;

    assert!(path.exists(), "Store should create the file");
    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
    assert_eq!(json, serde_json::json!({ "guilds": {} }));
    assert_eq!(store.get(&GroupId::from("123")), Threshold::DEFAULT);
    assert_eq!(Threshold::DEFAULT.value(), 70);

    Ok(())
}

#[tokio::test]
async fn test_set_persists_across_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("thresholds.json");
    let group = GroupId::from("123");

    {
        let store = JsonThresholdStore::open(&path).await?;
        assert_eq!(store.set(&group, 85).await?.value(), 85);
    }

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
    assert_eq!(json["guilds"]["123"]["decibelThreshold"], 85);

    let reopened = JsonThresholdStore::open(&path).await?;
    assert_eq!(reopened.get(&group).value(), 85);
    assert_eq!(reopened.get(&GroupId::from("other")).value(), 70);

    Ok(())
}

#[tokio::test]
async fn test_out_of_range_rejected_and_prior_value_kept() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("thresholds.json");
    let group = GroupId::from("123");

    let store = JsonThresholdStore::open(&path).await?;
    store.set(&group, 90).await?;
    let before = fs::read(&path)?;

    for value in [-1, 151, i64::MAX, i64::MIN] {
        let err = store.set(&group, value).await.unwrap_err();
        assert!(matches!(err, ModerationError::InvalidRange(v) if v == value.to_string()));
    }

    assert_eq!(store.get(&group).value(), 90);
    assert_eq!(fs::read(&path)?, before, "Rejected writes must not touch disk");

    Ok(())
}

#[tokio::test]
async fn test_boundaries_accepted() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = JsonThresholdStore::open(temp_dir.path().join("thresholds.json")).await?;
    let group = GroupId::from("123");

    assert_eq!(store.set(&group, 0).await?.value(), 0);
    assert_eq!(store.get(&group).value(), 0);
    assert_eq!(store.set(&group, 150).await?.value(), 150);
    assert_eq!(store.get(&group).value(), 150);

    Ok(())
}

#[tokio::test]
async fn test_existing_file_layout_is_read() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
    "guilds": {
        "111": { "decibelThreshold": 40 },
        "222": {},
        "333": { "decibelThreshold": 400 }
    }
}"#,
    )?;

    let store = JsonThresholdStore::open(&path).await?;

    assert_eq!(store.get(&GroupId::from("111")).value(), 40);
    assert_eq!(store.get(&GroupId::from("222")).value(), 70);
    // Hand-edited out-of-range values fall back to the default
    assert_eq!(store.get(&GroupId::from("333")).value(), 70);

    Ok(())
}

#[tokio::test]
async fn test_memory_store_validates_at_write() {
    let store = MemoryThresholdStore::new();
    let group = GroupId::from("g");

    store.set(&group, 42).await.unwrap();
    assert!(matches!(
        store.set(&group, 151).await,
        Err(ModerationError::InvalidRange(v)) if v == "151"
    ));
    assert_eq!(store.get(&group).value(), 42);
}

#[tokio::test]
async fn test_concurrent_sets_all_persist() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("thresholds.json");
    let store = Arc::new(JsonThresholdStore::open(&path).await?);

    let mut tasks = Vec::new();
    for i in 0..20i64 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.set(&GroupId::new(format!("group-{}", i)), 50 + i).await
        }));
    }
    // Reads never wait on the pending writes
    for _ in 0..100 {
        let value = store.get(&GroupId::from("group-3")).value();
        assert!(value == 70 || value == 53);
        tokio::task::yield_now().await;
    }
    for task in tasks {
        task.await??;
    }

    let reopened = JsonThresholdStore::open(&path).await?;
    for i in 0..20i64 {
        assert_eq!(
            i64::from(reopened.get(&GroupId::new(format!("group-{}", i))).value()),
            50 + i
        );
    }

    Ok(())
}
