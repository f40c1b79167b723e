use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use thiserror::Error;

use crate::config::AppConfig;
use crate::favorites::{FavoritesStore, PersistenceError};
use crate::filters;
use crate::models::{Event, FilterSpec};
use crate::sharing::ShareChain;
use crate::sources::{self, EventSource, FetchError};
use crate::storage::KeyValueStorage;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("event fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("event {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl AppError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Fetch(_) => "Could not load events. Check your connection and try again.",
            AppError::NotFound(_) => "Event not found",
            AppError::Persistence(_) => "Could not update favorites.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Loaded(usize),
    /// A newer reload was issued while this one was in flight; its result
    /// was dropped.
    Stale,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub event: Event,
    pub is_favorite: bool,
}

#[derive(Default)]
struct BrowserState {
    events: Vec<Event>,
    filters: FilterSpec,
}

/// Joins the event source, filters, favorites and sharing behind one
/// handle. Safe to share between tasks.
pub struct EventBrowser {
    source: Box<dyn EventSource>,
    favorites: FavoritesStore,
    sharing: ShareChain,
    state: Mutex<BrowserState>,
    latest_request: AtomicU64,
}

impl EventBrowser {
    pub fn new(
        source: Box<dyn EventSource>,
        favorites: FavoritesStore,
        sharing: ShareChain,
    ) -> Self {
        Self {
            source,
            favorites,
            sharing,
            state: Mutex::new(BrowserState::default()),
            latest_request: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &AppConfig, storage: Arc<dyn KeyValueStorage>) -> Self {
        let source = sources::select_source(config);
        debug!("using {} event source", source.name());
        Self::new(
            source,
            FavoritesStore::new(storage),
            ShareChain::system(config),
        )
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fetches the full listing. Only the most recently issued reload may
    /// replace the list; a failed reload clears it.
    pub async fn reload(&self) -> Result<ReloadOutcome, AppError> {
        let token = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.source.get_events().await;

        let mut state = self.state();
        if self.latest_request.load(Ordering::SeqCst) != token {
            warn!("discarding stale event listing (request {token})");
            return Ok(ReloadOutcome::Stale);
        }
        match result {
            Ok(events) => {
                let count = events.len();
                state.events = events;
                debug!("loaded {count} events from {}", self.source.name());
                Ok(ReloadOutcome::Loaded(count))
            }
            Err(err) => {
                state.events.clear();
                error!("event listing failed: {err}");
                Err(AppError::Fetch(err))
            }
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn filters(&self) -> FilterSpec {
        self.state().filters.clone()
    }

    pub fn set_filters(&self, spec: FilterSpec) {
        self.state().filters = spec;
    }

    /// Applies a transition such as `|spec| spec.with_state("SP")` to the
    /// live filters and returns the result.
    pub fn update_filters<F>(&self, transition: F) -> FilterSpec
    where
        F: FnOnce(FilterSpec) -> FilterSpec,
    {
        let mut state = self.state();
        let next = transition(std::mem::take(&mut state.filters));
        state.filters = next.clone();
        next
    }

    pub fn clear_filters(&self) {
        self.state().filters = FilterSpec::default();
    }

    pub fn visible_events(&self) -> Vec<Event> {
        self.visible_events_at(Utc::now())
    }

    pub fn visible_events_at(&self, now: DateTime<Utc>) -> Vec<Event> {
        let state = self.state();
        filters::apply(&state.events, &state.filters, now)
    }

    pub fn summary_label(&self) -> String {
        let visible = self.visible_events();
        filters::summary_label(visible.len(), &self.filters())
    }

    pub fn state_options(&self) -> Vec<String> {
        filters::available_states(&self.state().events)
    }

    pub fn city_options(&self) -> Vec<String> {
        let state = self.state();
        filters::available_cities(&state.events, &state.filters.state)
    }

    pub async fn detail(&self, id: &str) -> Result<EventDetail, AppError> {
        let event = match self.source.get_event_by_id(id).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(AppError::NotFound(id.to_string())),
            Err(err) => {
                error!("event {id} lookup failed: {err}");
                return Err(AppError::Fetch(err));
            }
        };
        let is_favorite = self.favorites.contains(id).await;
        Ok(EventDetail { event, is_favorite })
    }

    /// Flips the favorite flag of `id`. On failure the stored flag is
    /// unchanged.
    pub async fn toggle_favorite(&self, id: &str) -> Result<bool, AppError> {
        self.favorites.toggle(id).await.map_err(|err| {
            error!("favorite toggle for {id} failed: {err}");
            AppError::Persistence(err)
        })
    }

    pub async fn is_favorite(&self, id: &str) -> bool {
        self.favorites.contains(id).await
    }

    /// Loaded events that are marked as favorites, in listing order.
    pub async fn favorite_events(&self) -> Vec<Event> {
        let ids = self.favorites.list().await;
        self.events()
            .into_iter()
            .filter(|event| ids.contains(&event.id))
            .collect()
    }

    pub async fn share(&self, id: &str) -> bool {
        let loaded = self.state().events.iter().find(|e| e.id == id).cloned();
        let event = match loaded {
            Some(event) => event,
            None => match self.source.get_event_by_id(id).await {
                Ok(Some(event)) => event,
                Ok(None) => return false,
                Err(err) => {
                    warn!("share lookup for {id} failed: {err}");
                    return false;
                }
            },
        };
        self.sharing.share_event(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharing::ExportFile;
    use crate::sources::fixture::StaticEventSource;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Answers the first listing slowly and every later one immediately,
    /// each with a different single event.
    struct SlowThenFast {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventSource for SlowThenFast {
        fn name(&self) -> &'static str {
            "slow_then_fast"
        }

        async fn get_events(&self) -> Result<Vec<Event>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let mut events = StaticEventSource::sample().get_events().await?;
            events.truncate(1);
            events[0].id = format!("call-{call}");
            Ok(events)
        }

        async fn get_event_by_id(&self, _id: &str) -> Result<Option<Event>, FetchError> {
            Ok(None)
        }
    }

    struct Failing;

    #[async_trait]
    impl EventSource for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn get_events(&self) -> Result<Vec<Event>, FetchError> {
            Err(FetchError::Http("connection refused".into()))
        }

        async fn get_event_by_id(&self, _id: &str) -> Result<Option<Event>, FetchError> {
            Err(FetchError::Http("connection refused".into()))
        }
    }

    /// The returned directory holds share exports and must outlive the test.
    fn browser(source: Box<dyn EventSource>) -> (Arc<MemoryStorage>, EventBrowser, TempDir) {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let sharing = ShareChain::new(
            vec![Box::new(ExportFile::new(dir.path().join("share.txt")))],
            Tz::UTC,
        );
        let browser = EventBrowser::new(source, FavoritesStore::new(storage.clone()), sharing);
        (storage, browser, dir)
    }

    #[tokio::test]
    async fn later_reload_wins_over_slow_earlier_one() {
        let (_, browser, _dir) = browser(Box::new(SlowThenFast {
            calls: AtomicUsize::new(0),
        }));
        let (first, second) = tokio::join!(browser.reload(), browser.reload());
        assert_eq!(first.expect("first reload"), ReloadOutcome::Stale);
        assert_eq!(second.expect("second reload"), ReloadOutcome::Loaded(1));
        assert_eq!(browser.events()[0].id, "call-1");
    }

    #[tokio::test]
    async fn failed_reload_shows_no_partial_list() {
        let (_, browser, _dir) = browser(Box::new(Failing));
        let err = browser.reload().await.expect_err("reload should fail");
        assert!(matches!(err, AppError::Fetch(_)));
        assert_eq!(
            err.user_message(),
            "Could not load events. Check your connection and try again."
        );
        assert!(browser.events().is_empty());
    }

    #[tokio::test]
    async fn not_found_is_distinct_from_fetch_failure() {
        let (_, fixture, _dir) = browser(Box::new(StaticEventSource::sample()));
        let err = fixture.detail("missing").await.expect_err("missing event");
        assert!(matches!(err, AppError::NotFound(ref id) if id == "missing"));
        assert_eq!(err.user_message(), "Event not found");

        let (_, failing, _dir) = browser(Box::new(Failing));
        let err = failing.detail("1").await.expect_err("fetch failure");
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[tokio::test]
    async fn state_change_drops_city_in_live_filters() {
        let (_, browser, _dir) = browser(Box::new(StaticEventSource::sample()));
        browser.reload().await.expect("reload");

        browser.update_filters(|spec| spec.with_state("SP").with_city("Campinas"));
        assert_eq!(browser.city_options(), vec!["Campinas", "São Paulo"]);
        let now = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
        let visible = browser.visible_events_at(now);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "4");

        let spec = browser.update_filters(|spec| spec.with_state("GO"));
        assert!(spec.city.is_empty());
        assert!(browser.filters().city.is_empty());
        assert_eq!(browser.state_options(), vec!["GO", "SP"]);

        browser.clear_filters();
        assert!(!browser.filters().is_active());
        assert_eq!(browser.visible_events_at(now).len(), 5);
    }

    #[tokio::test]
    async fn favorite_toggle_reverts_on_write_failure() {
        let (storage, browser, _dir) = browser(Box::new(StaticEventSource::sample()));
        browser.reload().await.expect("reload");

        assert!(browser.toggle_favorite("2").await.expect("favorite"));
        let detail = browser.detail("2").await.expect("detail");
        assert!(detail.is_favorite);
        assert_eq!(
            browser
                .favorite_events()
                .await
                .iter()
                .map(|e| e.id.as_str())
                .collect::<Vec<_>>(),
            vec!["2"]
        );

        storage.fail_writes(true);
        let err = browser.toggle_favorite("2").await.expect_err("write fails");
        assert_eq!(err.user_message(), "Could not update favorites.");
        assert!(browser.is_favorite("2").await);
    }

    #[tokio::test]
    async fn share_unknown_event_reports_false() {
        let (_, browser, dir) = browser(Box::new(StaticEventSource::sample()));
        assert!(!browser.share("missing").await);
        assert!(browser.share("1").await);
        let exported = std::fs::read_to_string(dir.path().join("share.txt")).expect("export");
        assert!(exported.starts_with("Festival de Arte de Rua SP"));
    }
}
