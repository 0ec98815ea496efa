// tests/stores.rs

mod common;

use chrono::{TimeZone, Utc};

use cherry_security::AppContext;
use cherry_security::antinuke::enablement::EnabledGuilds;
use cherry_security::warn::WarnLedger;

#[tokio::test]
async fn corrupt_enablement_file_loads_empty_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("security_enabled.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    let guilds = EnabledGuilds::load(&path).await;
    assert!(guilds.snapshot().await.is_empty());
    assert!(dir.path().join("security_enabled.bak").exists());

    assert!(guilds.enable(42).await.unwrap());
    assert!(guilds.is_enabled(42).await);

    let reloaded = EnabledGuilds::load(&path).await;
    assert_eq!(reloaded.snapshot().await, vec![42]);
    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(serde_json::from_str::<Vec<u64>>(&raw).unwrap(), vec![42]);
}

#[tokio::test]
async fn enable_and_disable_report_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("enabled.json");
    let guilds = EnabledGuilds::load(&path).await;

    assert!(guilds.enable(7).await.unwrap());
    assert!(!guilds.enable(7).await.unwrap());
    assert!(guilds.enable(3).await.unwrap());
    assert_eq!(guilds.snapshot().await, vec![3, 7]);

    assert!(guilds.disable(7).await.unwrap());
    assert!(!guilds.disable(7).await.unwrap());
    assert!(!guilds.is_enabled(7).await);

    let reloaded = EnabledGuilds::load(&path).await;
    assert_eq!(reloaded.snapshot().await, vec![3]);
}

#[tokio::test]
async fn legacy_warnings_file_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warnings.json");
    std::fs::write(
        &path,
        r#"{"42": [{"reason": "spam", "mod": 7, "time": "2024-01-02T03:04:05.123456"}]}"#,
    )
    .unwrap();

    let ledger = WarnLedger::load(&path).await;
    let list = ledger.list(42).await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].reason, "spam");
    assert_eq!(list[0].moderator_id, 7);
    assert_eq!(list[0].time.timestamp(), 1_704_164_645);

    let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    assert_eq!(ledger.append(42, "Flooding", 8, at).await.unwrap(), 2);

    let reloaded = WarnLedger::load(&path).await;
    let list = reloaded.list(42).await;
    assert_eq!(list.len(), 2);
    assert_eq!(list[1].reason, "flooding");
    assert_eq!(list[1].time, at);
}

#[tokio::test]
async fn corrupt_warnings_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warnings.json");
    std::fs::write(&path, "[1, 2").unwrap();

    let ledger = WarnLedger::load(&path).await;
    assert!(ledger.list(1).await.is_empty());
    assert!(dir.path().join("warnings.bak").exists());
}

#[tokio::test]
async fn context_reopens_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let settings = common::settings_in(dir.path());

    let ctx = AppContext::open(settings.clone()).await;
    ctx.guilds.enable(5).await.unwrap();
    ctx.warns.append(9, "spam", 1, Utc::now()).await.unwrap();
    drop(ctx);

    let ctx = AppContext::open(settings).await;
    assert!(ctx.guilds.is_enabled(5).await);
    assert_eq!(ctx.warns.list(9).await.len(), 1);
    assert!(ctx.antinuke().is_none());
}

#[tokio::test]
async fn failed_enable_leaves_memory_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("data");
    std::fs::write(&blocker, "regular file").unwrap();
    let guilds = EnabledGuilds::load(blocker.join("security_enabled.json")).await;

    assert!(guilds.enable(11).await.is_err());
    assert!(!guilds.is_enabled(11).await);
    assert!(guilds.snapshot().await.is_empty());
}

#[tokio::test]
async fn failed_warn_leaves_ledger_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("data");
    std::fs::write(&blocker, "regular file").unwrap();
    let ledger = WarnLedger::load(blocker.join("warnings.json")).await;

    assert!(ledger.append(42, "spam", 7, Utc::now()).await.is_err());
    assert!(ledger.list(42).await.is_empty());
}

#[tokio::test]
async fn repeated_enable_restores_a_lost_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("security_enabled.json");
    let guilds = EnabledGuilds::load(&path).await;
    assert!(guilds.enable(77).await.unwrap());

    std::fs::remove_file(&path).unwrap();
    assert!(!guilds.enable(77).await.unwrap());
    assert_eq!(EnabledGuilds::load(&path).await.snapshot().await, vec![77]);

    std::fs::write(&path, "garbage").unwrap();
    assert!(!guilds.enable(77).await.unwrap());
    assert_eq!(EnabledGuilds::load(&path).await.snapshot().await, vec![77]);
}
