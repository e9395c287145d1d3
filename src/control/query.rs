//! Live, filtered, paginated view over app-to-configuration mappings.
//!
//! Pages and per-configuration counts are cached between two consecutive
//! store notifications; a notification invalidates, the next read
//! re-derives. Filter changes supersede any in-flight page fetch: a cursor
//! created before the change never delivers another page.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::control::error::{QueryError, QueryResult};
use crate::control::types::{AppMapping, ConfigId};
use crate::store::{MappingStore, Page, PageToken};

struct FilterState {
    pattern: String,
    generation: u64,
}

struct PageCache {
    /// Filter generation the cached pages belong to
    generation: u64,
    /// Bumped on every store notification so an in-flight fetch cannot
    /// install a page the notification already invalidated
    epoch: u64,
    pages: HashMap<u64, Page<AppMapping>>,
}

struct CountCache {
    /// Bumped on every store notification so an in-flight fetch cannot
    /// install a value the notification already invalidated
    epoch: u64,
    counts: HashMap<ConfigId, u64>,
}

/// Query surface for the app-to-configuration mapping table.
pub struct MappingQueryService<M: MappingStore> {
    store: Arc<M>,
    filter: RwLock<FilterState>,
    pages: Arc<Mutex<PageCache>>,
    counts: Arc<Mutex<CountCache>>,
    listen_task: JoinHandle<()>,
}

impl<M: MappingStore> MappingQueryService<M> {
    /// Create a service over the given store with an empty (wildcard)
    /// filter, subscribing to mapping-change notifications.
    pub fn new(store: Arc<M>) -> Self {
        let filter = RwLock::new(FilterState {
            pattern: String::new(),
            generation: 0,
        });
        let pages = Arc::new(Mutex::new(PageCache {
            generation: 0,
            epoch: 0,
            pages: HashMap::new(),
        }));
        let counts = Arc::new(Mutex::new(CountCache {
            epoch: 0,
            counts: HashMap::new(),
        }));
        let listen_task = Self::start_listen_task(&store, pages.clone(), counts.clone());
        MappingQueryService {
            store,
            filter,
            pages,
            counts,
            listen_task,
        }
    }

    fn start_listen_task(
        store: &Arc<M>,
        pages: Arc<Mutex<PageCache>>,
        counts: Arc<Mutex<CountCache>>,
    ) -> JoinHandle<()> {
        let mut rx = store.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        debug!(config_ids = ?change.config_ids, "mapping change notification");
                        {
                            let mut pages = pages.lock().unwrap();
                            pages.epoch += 1;
                            pages.pages.clear();
                        }
                        let mut counts = counts.lock().unwrap();
                        counts.epoch += 1;
                        for id in &change.config_ids {
                            counts.counts.remove(id);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "mapping notifications lagged, dropping caches");
                        {
                            let mut pages = pages.lock().unwrap();
                            pages.epoch += 1;
                            pages.pages.clear();
                        }
                        let mut counts = counts.lock().unwrap();
                        counts.epoch += 1;
                        counts.counts.clear();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Record a substring filter for subsequent [`paged_apps`] cursors. An
    /// empty pattern matches every row. The filter persists until replaced;
    /// cursors created under the previous filter are superseded.
    ///
    /// [`paged_apps`]: MappingQueryService::paged_apps
    pub fn set_filter(&self, pattern: &str) {
        let generation = {
            let mut filter = self.filter.write().unwrap();
            filter.pattern = pattern.to_string();
            filter.generation += 1;
            filter.generation
        };
        let mut pages = self.pages.lock().unwrap();
        pages.generation = generation;
        pages.pages.clear();
        debug!(pattern, generation, "filter updated");
    }

    /// The currently recorded filter pattern.
    pub fn filter(&self) -> String {
        self.filter.read().unwrap().pattern.clone()
    }

    /// Start a page cursor bound to the current filter. The cursor pulls
    /// pages on demand and returns [`QueryError::Superseded`] once the
    /// filter changes underneath it.
    pub fn paged_apps(&self) -> AppPages<'_, M> {
        let filter = self.filter.read().unwrap();
        AppPages {
            service: self,
            pattern: filter.pattern.clone(),
            generation: filter.generation,
            next: Some(PageToken::default()),
        }
    }

    /// Number of applications mapped to the given configuration. Served from
    /// cache until a store notification touching `id` invalidates it.
    pub async fn count_by_config(&self, id: ConfigId) -> QueryResult<u64> {
        let epoch = {
            let cache = self.counts.lock().unwrap();
            if let Some(count) = cache.counts.get(&id) {
                return Ok(*count);
            }
            cache.epoch
        };

        let count = self.store.count_by_config(id).await?;

        let mut cache = self.counts.lock().unwrap();
        if cache.epoch == epoch {
            cache.counts.insert(id, count);
        }
        Ok(count)
    }

    fn current_generation(&self) -> u64 {
        self.filter.read().unwrap().generation
    }

    fn page_epoch(&self) -> u64 {
        self.pages.lock().unwrap().epoch
    }

    fn cached_page(&self, generation: u64, token: PageToken) -> Option<Page<AppMapping>> {
        let cache = self.pages.lock().unwrap();
        if cache.generation != generation {
            return None;
        }
        cache.pages.get(&token.0).cloned()
    }

    fn cache_page(&self, generation: u64, epoch: u64, token: PageToken, page: &Page<AppMapping>) {
        let mut cache = self.pages.lock().unwrap();
        if cache.generation == generation && cache.epoch == epoch {
            cache.pages.insert(token.0, page.clone());
        }
    }
}

impl<M: MappingStore> Drop for MappingQueryService<M> {
    fn drop(&mut self) {
        self.listen_task.abort();
    }
}

/// Pull-based page cursor over the mapping table, bound to the filter that
/// was current when it was created. Not resumable across filter changes;
/// re-issue via [`MappingQueryService::paged_apps`].
pub struct AppPages<'a, M: MappingStore> {
    service: &'a MappingQueryService<M>,
    pattern: String,
    generation: u64,
    next: Option<PageToken>,
}

impl<M: MappingStore> AppPages<'_, M> {
    /// Fetch the next page. `Ok(None)` once the sequence is exhausted;
    /// [`QueryError::Superseded`] once the service filter has moved on, in
    /// which case no page computed against the old pattern is ever
    /// delivered.
    pub async fn next_page(&mut self) -> QueryResult<Option<Vec<AppMapping>>> {
        let Some(token) = self.next else {
            return Ok(None);
        };

        if self.service.current_generation() != self.generation {
            return Err(QueryError::Superseded);
        }

        let page = match self.service.cached_page(self.generation, token) {
            Some(page) => page,
            None => {
                let epoch = self.service.page_epoch();
                let page = self.service.store.query(&self.pattern, token).await?;
                // The filter may have changed while the fetch was in
                // flight; discard rather than deliver a stale page.
                if self.service.current_generation() != self.generation {
                    return Err(QueryError::Superseded);
                }
                // A store notification may also have arrived mid-fetch;
                // this page predates the mutation, so it must not outlive
                // the cache clear the notification triggered.
                self.service.cache_page(self.generation, epoch, token, &page);
                page
            }
        };

        self.next = page.next;
        Ok(Some(page.items))
    }

    /// Drain every remaining page into a single vector.
    pub async fn collect_all(mut self) -> QueryResult<Vec<AppMapping>> {
        let mut all = Vec::new();
        while let Some(mut items) = self.next_page().await? {
            all.append(&mut items);
        }
        Ok(all)
    }
}
