use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, broadcast};
use tokio::time::sleep;
use tunnelctl::{
    AppMapping, ConfigId, MappingChange, MappingQueryService, MappingStore, MemoryMappingStore,
    Page, PageToken, QueryError, StoreError,
};

fn seeded_store(page_size: usize) -> Arc<MemoryMappingStore> {
    let store = Arc::new(MemoryMappingStore::with_options(page_size, true, 64));
    store.upsert(AppMapping::new("org.mozilla.firefox", "Firefox", 1));
    store.upsert(AppMapping::new("com.spotify.music", "Spotify", 1));
    store.upsert(AppMapping::new("org.signal.app", "Signal", 2));
    store.upsert(AppMapping::new("com.termux", "Termux", 2));
    store.upsert(AppMapping::new("org.videolan.vlc", "VLC", 3));
    store
}

#[tokio::test]
async fn empty_filter_returns_every_mapping() {
    let store = seeded_store(2);
    let service = MappingQueryService::new(store.clone());

    let all = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(all.len(), store.len());
}

#[tokio::test]
async fn wildcard_filter_equals_no_filter_at_all() {
    let store = seeded_store(2);
    let service = MappingQueryService::new(store);

    let unfiltered = service.paged_apps().collect_all().await.unwrap();
    service.set_filter("");
    let wildcard = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(unfiltered.len(), wildcard.len());
}

#[tokio::test]
async fn substring_filter_narrows_the_view() {
    let store = seeded_store(10);
    let service = MappingQueryService::new(store);

    service.set_filter("fire");
    let apps = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].app_name, "Firefox");

    // Case-insensitive by store policy
    service.set_filter("SIGNAL");
    let apps = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].app_id, "org.signal.app");
}

#[tokio::test]
async fn pages_come_in_bounded_chunks() {
    let store = seeded_store(2);
    let service = MappingQueryService::new(store);

    let mut cursor = service.paged_apps();
    let mut sizes = Vec::new();
    while let Some(page) = cursor.next_page().await.unwrap() {
        sizes.push(page.len());
    }
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn superseded_filter_discards_the_stale_cursor() {
    let store = seeded_store(2);
    let service = MappingQueryService::new(store);

    service.set_filter("o");
    let mut cursor = service.paged_apps();
    let first = cursor.next_page().await.unwrap();
    assert!(first.is_some());

    // Filter replaced mid-iteration: no page computed against "o" may be
    // delivered from here on.
    service.set_filter("spotify");
    assert!(matches!(
        cursor.next_page().await,
        Err(QueryError::Superseded)
    ));

    let fresh = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].app_name, "Spotify");
}

#[tokio::test]
async fn count_by_config_tracks_inserts_and_removals() {
    let store = Arc::new(MemoryMappingStore::new());
    let service = MappingQueryService::new(store.clone());

    for i in 0..5 {
        store.upsert(AppMapping::new(format!("app.{i}"), format!("App {i}"), 1));
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(service.count_by_config(ConfigId(1)).await.unwrap(), 5);

    store.remove("app.0");
    store.remove("app.1");
    sleep(Duration::from_millis(50)).await;
    assert_eq!(service.count_by_config(ConfigId(1)).await.unwrap(), 3);
}

#[tokio::test]
async fn counts_are_scoped_to_their_config() {
    let store = seeded_store(10);
    let service = MappingQueryService::new(store);

    assert_eq!(service.count_by_config(ConfigId(1)).await.unwrap(), 2);
    assert_eq!(service.count_by_config(ConfigId(2)).await.unwrap(), 2);
    assert_eq!(service.count_by_config(ConfigId(3)).await.unwrap(), 1);
    assert_eq!(service.count_by_config(ConfigId(99)).await.unwrap(), 0);
}

#[tokio::test]
async fn new_rows_show_up_after_a_notification_cycle() {
    let store = seeded_store(10);
    let service = MappingQueryService::new(store.clone());

    // Warm the page cache
    let before = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(before.len(), 5);

    store.upsert(AppMapping::new("net.example.new", "Newcomer", 3));
    sleep(Duration::from_millis(50)).await;

    let after = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(after.len(), 6);
}

/// Mapping store whose next `query` snapshots the table, then parks until
/// released, so a mutation can land mid-fetch.
struct GatedMappingStore {
    inner: MemoryMappingStore,
    stall_next: AtomicBool,
    gate: Semaphore,
}

impl GatedMappingStore {
    fn new() -> Self {
        GatedMappingStore {
            inner: MemoryMappingStore::with_options(10, true, 64),
            stall_next: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    fn stall_next_query(&self) {
        self.stall_next.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl MappingStore for GatedMappingStore {
    async fn query(
        &self,
        pattern: &str,
        token: PageToken,
    ) -> Result<Page<AppMapping>, StoreError> {
        let page = self.inner.query(pattern, token).await?;
        if self.stall_next.swap(false, Ordering::SeqCst) {
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        Ok(page)
    }

    async fn count_by_config(&self, id: ConfigId) -> Result<u64, StoreError> {
        self.inner.count_by_config(id).await
    }

    fn subscribe(&self) -> broadcast::Receiver<MappingChange> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn page_fetched_before_a_mutation_does_not_outlive_its_notification() {
    let store = Arc::new(GatedMappingStore::new());
    store
        .inner
        .upsert(AppMapping::new("org.mozilla.firefox", "Firefox", 1));
    let service = MappingQueryService::new(store.clone());

    store.stall_next_query();
    let mut cursor = service.paged_apps();
    let (stalled, ()) = tokio::join!(cursor.next_page(), async {
        // Let the fetch snapshot the table and park on the gate
        sleep(Duration::from_millis(20)).await;
        store
            .inner
            .upsert(AppMapping::new("com.spotify.music", "Spotify", 1));
        // Give the notification a cycle to clear the page cache
        sleep(Duration::from_millis(50)).await;
        store.release();
    });

    // The in-flight fetch observed the pre-mutation snapshot, which is fine
    assert_eq!(stalled.unwrap().unwrap().len(), 1);

    // But that snapshot must not land back in the cache the notification
    // cleared: a cursor issued afterwards sees the committed row.
    let fresh = service.paged_apps().collect_all().await.unwrap();
    assert_eq!(fresh.len(), 2);
}

/// Mapping store whose read path always fails.
struct BrokenMappingStore {
    tx: broadcast::Sender<MappingChange>,
}

impl BrokenMappingStore {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        BrokenMappingStore { tx }
    }
}

#[async_trait]
impl MappingStore for BrokenMappingStore {
    async fn query(
        &self,
        _pattern: &str,
        _token: PageToken,
    ) -> Result<Page<AppMapping>, StoreError> {
        Err(StoreError::Backend("mapping table offline".to_string()))
    }

    async fn count_by_config(&self, _id: ConfigId) -> Result<u64, StoreError> {
        Err(StoreError::Backend("mapping table offline".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<MappingChange> {
        self.tx.subscribe()
    }
}

#[tokio::test]
async fn read_path_store_errors_are_reported_not_swallowed() {
    let service = MappingQueryService::new(Arc::new(BrokenMappingStore::new()));

    // No silent zero count when the store fails
    assert!(matches!(
        service.count_by_config(ConfigId(1)).await,
        Err(QueryError::Store(_))
    ));

    let mut cursor = service.paged_apps();
    assert!(matches!(cursor.next_page().await, Err(QueryError::Store(_))));
}

#[tokio::test]
async fn disabling_a_config_leaves_its_mappings_untouched() {
    use tunnelctl::{ActivationController, ConfigStore, MemoryConfigStore, TunnelConfig};

    let configs = Arc::new(MemoryConfigStore::new());
    configs.insert(TunnelConfig::new(1, "wg0"));
    let controller = ActivationController::new(configs.clone()).await.unwrap();

    let mappings = seeded_store(10);
    let service = MappingQueryService::new(mappings);

    controller.enable(ConfigId(1)).await.unwrap();
    assert_eq!(service.count_by_config(ConfigId(1)).await.unwrap(), 2);

    // Disabling releases the resource claim but never reassigns mappings
    controller.disable(ConfigId(1)).await.unwrap();
    assert_eq!(service.count_by_config(ConfigId(1)).await.unwrap(), 2);
    assert!(!configs.get(ConfigId(1)).await.unwrap().unwrap().is_active);
}
