// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::error::ErrorKind;
use crate::model::Device;
use parking_lot::Mutex as PlMutex;

/// Scripted inventory: a mutable device list plus a boot log.
struct FakeInventory {
    devices: PlMutex<Vec<Device>>,
    booted: PlMutex<Vec<String>>,
}

impl FakeInventory {
    fn new(devices: Vec<Device>) -> Arc<Self> {
        Arc::new(Self { devices: PlMutex::new(devices), booted: PlMutex::new(Vec::new()) })
    }
}

#[async_trait]
impl DeviceInventory for FakeInventory {
    async fn list_devices(&self) -> crate::error::Result<Vec<Device>> {
        Ok(self.devices.lock().clone())
    }

    async fn boot(&self, udid: &str) -> crate::error::Result<()> {
        self.booted.lock().push(udid.to_owned());
        // Booting takes effect immediately in the fake.
        for d in self.devices.lock().iter_mut() {
            if d.udid == udid {
                d.state = DeviceState::Booted;
            }
        }
        Ok(())
    }
}

fn device(udid: &str, name: &str, os: &str, state: DeviceState) -> Device {
    Device {
        udid: udid.to_owned(),
        name: name.to_owned(),
        os_version: os.to_owned(),
        device_type: DeviceType::Simulator,
        state,
        is_available: true,
    }
}

fn pool_with(devices: Vec<Device>) -> (DevicePool, Arc<FakeInventory>, tempfile::TempDir) {
    #[allow(clippy::unwrap_used)] // test setup
    let dir = tempfile::tempdir().unwrap();
    let inventory = FakeInventory::new(devices);
    let store = PoolStore::new(dir.path().join("device-pool.json"));
    (DevicePool::new(store, Arc::clone(&inventory) as Arc<dyn DeviceInventory>), inventory, dir)
}

#[tokio::test]
async fn resolve_prefers_booted_unclaimed() -> anyhow::Result<()> {
    let (pool, _, _dir) = pool_with(vec![
        device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Shutdown),
        device("B", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
    ]);

    let req = ResolveRequest { name: Some("iphone 16".to_owned()), ..ResolveRequest::default() };
    assert_eq!(pool.resolve(&req).await?, "B");
    Ok(())
}

#[tokio::test]
async fn resolve_explicit_udid_wins() -> anyhow::Result<()> {
    let (pool, _, _dir) = pool_with(vec![
        device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
        device("B", "iPhone 15", "iOS 17.5", DeviceState::Shutdown),
    ]);
    let req = ResolveRequest { udid: Some("B".to_owned()), ..ResolveRequest::default() };
    assert_eq!(pool.resolve(&req).await?, "B");
    Ok(())
}

#[tokio::test]
async fn resolve_unknown_udid_is_not_found() {
    let (pool, _, _dir) = pool_with(vec![]);
    let req = ResolveRequest { udid: Some("NOPE".to_owned()), ..ResolveRequest::default() };
    let err = match pool.resolve(&req).await {
        Err(e) => e,
        Ok(_) => return assert!(false, "unknown udid must fail"),
    };
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn resolve_auto_boots_shutdown_candidate() -> anyhow::Result<()> {
    let (pool, inventory, _dir) = pool_with(vec![device(
        "A",
        "iPhone 16 Pro",
        "iOS 18.2",
        DeviceState::Shutdown,
    )]);

    let req = ResolveRequest { auto_boot: true, ..ResolveRequest::default() };
    assert_eq!(pool.resolve(&req).await?, "A");
    assert_eq!(inventory.booted.lock().as_slice(), ["A"]);
    Ok(())
}

#[tokio::test]
async fn resolve_without_auto_boot_reports_shutdown_devices() {
    let (pool, _, _dir) =
        pool_with(vec![device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Shutdown)]);
    let err = match pool.resolve(&ResolveRequest::default()).await {
        Err(e) => e,
        Ok(_) => return assert!(false, "shutdown-only pool must fail without auto_boot"),
    };
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.message.contains("auto_boot"), "message: {}", err.message);
}

#[tokio::test]
async fn resolve_claims_atomically_under_contention() -> anyhow::Result<()> {
    let (pool, _, _dir) = pool_with(vec![
        device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
        device("B", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
        device("C", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
    ]);
    let pool = Arc::new(pool);

    let mut handles = Vec::new();
    for session in ["s1", "s2", "s3"] {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let req = ResolveRequest {
                name: Some("iPhone 16 Pro".to_owned()),
                session_id: Some(session.to_owned()),
                ..ResolveRequest::default()
            };
            pool.resolve(&req).await
        }));
    }

    let mut got = Vec::new();
    for handle in handles {
        got.push(handle.await??);
    }
    got.sort();
    got.dedup();
    assert_eq!(got.len(), 3, "each device is handed out exactly once");

    // A fourth claimant conflicts.
    let req = ResolveRequest {
        name: Some("iPhone 16 Pro".to_owned()),
        session_id: Some("s4".to_owned()),
        ..ResolveRequest::default()
    };
    let err = match pool.resolve(&req).await {
        Err(e) => e,
        Ok(_) => return Err(anyhow::anyhow!("fourth claim must conflict")),
    };
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(err.message.contains("claimed"));
    Ok(())
}

#[tokio::test]
async fn wait_if_busy_observes_cross_process_release() -> anyhow::Result<()> {
    let (pool, _, _dir) = pool_with(vec![device(
        "A",
        "iPhone 16 Pro",
        "iOS 18.2",
        DeviceState::Booted,
    )]);
    let pool = Arc::new(pool);

    pool.claim("A", "holder").await?;

    let waiter = Arc::clone(&pool);
    let handle = tokio::spawn(async move {
        let req = ResolveRequest {
            session_id: Some("waiter".to_owned()),
            wait_if_busy: true,
            wait_timeout_s: Some(10.0),
            ..ResolveRequest::default()
        };
        waiter.resolve(&req).await
    });

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    pool.release("A", Some("holder"))?;

    let udid = handle.await??;
    assert_eq!(udid, "A");
    Ok(())
}

#[tokio::test]
async fn short_wait_timeout_is_respected() {
    let (pool, _, _dir) =
        pool_with(vec![device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted)]);
    if pool.claim("A", "holder").await.is_err() {
        return assert!(false, "claim must succeed");
    }

    let started = std::time::Instant::now();
    let req = ResolveRequest {
        session_id: Some("waiter".to_owned()),
        wait_if_busy: true,
        wait_timeout_s: Some(0.5),
        ..ResolveRequest::default()
    };
    let err = match pool.resolve(&req).await {
        Err(e) => e,
        Ok(_) => return assert!(false, "wait must time out"),
    };
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(started.elapsed() <= std::time::Duration::from_millis(1100));
}

#[tokio::test]
async fn diagnostics_distinguish_name_and_os_misses() {
    let (pool, _, _dir) = pool_with(vec![
        device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
        device("B", "iPad Air", "iOS 17.5", DeviceState::Booted),
    ]);

    // Name matches, OS does not.
    let req = ResolveRequest {
        name: Some("iPhone 16 Pro".to_owned()),
        os_version: Some("26".to_owned()),
        ..ResolveRequest::default()
    };
    let err = match pool.resolve(&req).await {
        Err(e) => e,
        Ok(_) => return assert!(false, "must not resolve"),
    };
    assert!(err.message.contains("observed versions"), "message: {}", err.message);
    assert!(err.message.contains("iOS 18.2"));

    // OS matches, name does not.
    let req = ResolveRequest {
        name: Some("Vision Pro".to_owned()),
        os_version: Some("18".to_owned()),
        ..ResolveRequest::default()
    };
    let err = match pool.resolve(&req).await {
        Err(e) => e,
        Ok(_) => return assert!(false, "must not resolve"),
    };
    assert!(err.message.contains("devices on that OS"), "message: {}", err.message);
    assert!(err.message.contains("iPhone 16 Pro"));
}

#[tokio::test]
async fn ensure_fills_with_boots_and_is_idempotent_per_session() -> anyhow::Result<()> {
    let (pool, inventory, _dir) = pool_with(vec![
        device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
        device("B", "iPhone 16 Pro", "iOS 18.2", DeviceState::Shutdown),
        device("C", "iPhone 16 Pro", "iOS 18.2", DeviceState::Shutdown),
    ]);

    let req = ResolveRequest {
        name: Some("iPhone 16 Pro".to_owned()),
        auto_boot: true,
        session_id: Some("ensure-session".to_owned()),
        ..ResolveRequest::default()
    };
    let mut first = pool.ensure(2, &req).await?;
    first.sort();
    assert_eq!(first.len(), 2);
    assert_eq!(inventory.booted.lock().len(), 1, "one boot fills the shortfall");

    // Same session, same criteria: the already-claimed devices come back.
    pool.invalidate_cache();
    let mut second = pool.ensure(2, &req).await?;
    second.sort();
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn ensure_distinguishes_not_enough_from_claimed() -> anyhow::Result<()> {
    let (pool, _, _dir) = pool_with(vec![
        device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
        device("B", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted),
    ]);

    // Not enough exist.
    let req = ResolveRequest { name: Some("iPhone 16 Pro".to_owned()), ..ResolveRequest::default() };
    let err = match pool.ensure(3, &req).await {
        Err(e) => e,
        Ok(_) => return Err(anyhow::anyhow!("3 of 2 must fail")),
    };
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.message.contains("only 2"), "message: {}", err.message);

    // Enough exist but claimed.
    pool.claim("A", "other").await?;
    let err = match pool.ensure(2, &req).await {
        Err(e) => e,
        Ok(_) => return Err(anyhow::anyhow!("claimed shortfall must fail")),
    };
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(err.message.contains("claimed"), "message: {}", err.message);
    Ok(())
}

#[tokio::test]
async fn stale_claims_are_cleaned_opportunistically() -> anyhow::Result<()> {
    let (pool, _, _dir) =
        pool_with(vec![device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted)]);
    pool.claim("A", "ghost").await?;

    // Age the claim past the threshold by rewriting the pool file.
    let entries = pool.entries().await?;
    assert!(entries[0].is_claimed());
    pool.cleanup()?; // fresh claim survives
    assert!(pool.entries().await?[0].is_claimed());

    // Backdate.
    let store = PoolStore::new(_dir.path().join("device-pool.json"));
    store.update(|p| {
        if let Some(e) = p.entry_mut("A") {
            e.claimed_at = Some(Utc::now() - chrono::Duration::minutes(31));
        }
    })?;

    let entries = pool.entries().await?;
    assert!(!entries[0].is_claimed(), "stale claim released on access");
    Ok(())
}

#[tokio::test]
async fn release_requires_matching_session() -> anyhow::Result<()> {
    let (pool, _, _dir) =
        pool_with(vec![device("A", "iPhone 16 Pro", "iOS 18.2", DeviceState::Booted)]);
    pool.claim("A", "owner").await?;

    assert!(!pool.release("A", Some("intruder"))?);
    assert!(pool.entries().await?[0].is_claimed());

    assert!(pool.release("A", Some("owner"))?);
    assert!(!pool.entries().await?[0].is_claimed());
    Ok(())
}
