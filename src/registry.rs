//! Library-scoped album registry shared by every browser view of that library.
//!
//! A [`RegistryPool`] hands out reference-counted handles keyed by library
//! scope. The registry is created by the first `acquire` and dropped with the
//! last handle. All mutation goes through the registry's lock and is announced
//! to attached views over a broadcast channel.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use log::{debug, info};
use tokio::sync::broadcast;

use crate::album::{Album, AlbumKey, CoverImage};
use crate::config::DisplaySettings;
use crate::protocol::RegistryEvent;

const REGISTRY_EVENT_CAPACITY: usize = 256;

/// Identity of the library a registry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryScope(String);

impl LibraryScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only view of the albums held by a registry.
#[derive(Debug, Default)]
pub struct AlbumIndex {
    albums: BTreeMap<AlbumKey, Album>,
}

impl AlbumIndex {
    pub fn get(&self, key: &AlbumKey) -> Option<&Album> {
        self.albums.get(key)
    }

    pub fn contains(&self, key: &AlbumKey) -> bool {
        self.albums.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Album> {
        self.albums.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &AlbumKey> {
        self.albums.keys()
    }
}

/// Outcome of writing a finished cover load into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverWrite {
    Applied,
    /// A manual refresh happened after the load was issued.
    Stale,
    /// The album left the registry while loading.
    Missing,
}

pub struct AlbumRegistry {
    scope: LibraryScope,
    index: RwLock<AlbumIndex>,
    events: broadcast::Sender<RegistryEvent>,
}

/// Shared handle; the registry lives as long as any handle does.
pub type RegistryHandle = Arc<AlbumRegistry>;

impl fmt::Debug for AlbumRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlbumRegistry")
            .field("scope", &self.scope)
            .field("albums", &self.album_count())
            .finish()
    }
}

impl AlbumRegistry {
    fn new(scope: LibraryScope) -> Self {
        let (events, _) = broadcast::channel(REGISTRY_EVENT_CAPACITY);
        info!("Registry: created scope={}", scope);
        Self {
            scope,
            index: RwLock::new(AlbumIndex::default()),
            events,
        }
    }

    pub fn scope(&self) -> &LibraryScope {
        &self.scope
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Runs `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&AlbumIndex) -> R) -> R {
        let index = self.index.read().expect("album registry lock poisoned");
        f(&index)
    }

    pub fn album_count(&self) -> usize {
        self.read(AlbumIndex::len)
    }

    pub fn contains(&self, key: &AlbumKey) -> bool {
        self.read(|index| index.contains(key))
    }

    pub fn album(&self, key: &AlbumKey) -> Option<Album> {
        self.read(|index| index.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<AlbumKey> {
        self.read(|index| index.keys().cloned().collect())
    }

    fn publish(&self, event: RegistryEvent) {
        // No receivers simply means no view is attached right now.
        let _ = self.events.send(event);
    }

    /// Inserts new albums and replaces existing ones, keeping their cover state.
    pub fn add_albums(&self, albums: Vec<Album>) {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        {
            let mut index = self.index.write().expect("album registry lock poisoned");
            for mut album in albums {
                let key = album.key().clone();
                if let Some(existing) = index.albums.get(&key) {
                    album.cover = existing.cover.clone();
                    album.scanned = existing.scanned;
                    album.cover_generation = existing.cover_generation;
                    changed.push(key.clone());
                } else {
                    added.push(key.clone());
                }
                index.albums.insert(key, album);
            }
        }
        debug!(
            "Registry: albums upserted scope={} added={} changed={}",
            self.scope,
            added.len(),
            changed.len()
        );
        if !added.is_empty() {
            self.publish(RegistryEvent::AlbumsAdded(added));
        }
        if !changed.is_empty() {
            self.publish(RegistryEvent::AlbumsChanged(changed));
        }
    }

    pub fn remove_albums(&self, keys: &[AlbumKey]) -> Vec<AlbumKey> {
        let removed: Vec<AlbumKey> = {
            let mut index = self.index.write().expect("album registry lock poisoned");
            keys.iter()
                .filter(|key| index.albums.remove(*key).is_some())
                .cloned()
                .collect()
        };
        if !removed.is_empty() {
            debug!(
                "Registry: albums removed scope={} count={}",
                self.scope,
                removed.len()
            );
            self.publish(RegistryEvent::AlbumsRemoved(removed.clone()));
        }
        removed
    }

    /// Tells every attached view that these albums changed.
    pub fn refresh(&self, keys: &[AlbumKey]) {
        if keys.is_empty() {
            return;
        }
        self.publish(RegistryEvent::AlbumsChanged(keys.to_vec()));
    }

    /// Moves albums back to the unscanned state so their covers load again.
    ///
    /// Loads already in flight for these albums become stale.
    pub fn mark_unscanned(&self, keys: &[AlbumKey]) -> Vec<AlbumKey> {
        let mut index = self.index.write().expect("album registry lock poisoned");
        let mut marked = Vec::new();
        for key in keys {
            if let Some(album) = index.albums.get_mut(key) {
                album.scanned = false;
                album.cover_generation = album.cover_generation.wrapping_add(1);
                marked.push(key.clone());
            }
        }
        marked
    }

    pub(crate) fn cover_generation(&self, key: &AlbumKey) -> Option<u64> {
        self.read(|index| index.get(key).map(|album| album.cover_generation))
    }

    pub(crate) fn write_cover(
        &self,
        key: &AlbumKey,
        generation: u64,
        cover: Option<Arc<CoverImage>>,
    ) -> CoverWrite {
        let mut index = self.index.write().expect("album registry lock poisoned");
        let Some(album) = index.albums.get_mut(key) else {
            return CoverWrite::Missing;
        };
        if album.cover_generation != generation {
            return CoverWrite::Stale;
        }
        album.cover = cover;
        album.scanned = true;
        CoverWrite::Applied
    }

    pub fn publish_display_settings(&self, settings: DisplaySettings) {
        self.publish(RegistryEvent::DisplaySettingsChanged(settings));
    }

    pub fn publish_pattern(&self, pattern: &str) {
        self.publish(RegistryEvent::PatternChanged(pattern.to_string()));
    }
}

impl Drop for AlbumRegistry {
    fn drop(&mut self) {
        info!("Registry: destroyed scope={}", self.scope);
    }
}

/// Hands out one shared registry per library scope.
#[derive(Default)]
pub struct RegistryPool {
    registries: Mutex<HashMap<LibraryScope, Weak<AlbumRegistry>>>,
}

impl RegistryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide pool used by the application.
    pub fn shared() -> &'static RegistryPool {
        static POOL: OnceLock<RegistryPool> = OnceLock::new();
        POOL.get_or_init(RegistryPool::new)
    }

    /// Returns the live registry for `scope`, creating it if none exists.
    pub fn acquire(&self, scope: &LibraryScope) -> RegistryHandle {
        let mut registries = self.registries.lock().expect("registry pool lock poisoned");
        registries.retain(|_, registry| registry.strong_count() > 0);
        if let Some(existing) = registries.get(scope).and_then(Weak::upgrade) {
            return existing;
        }
        let registry = Arc::new(AlbumRegistry::new(scope.clone()));
        registries.insert(scope.clone(), Arc::downgrade(&registry));
        registry
    }

    pub fn get(&self, scope: &LibraryScope) -> Option<RegistryHandle> {
        let registries = self.registries.lock().expect("registry pool lock poisoned");
        registries.get(scope).and_then(Weak::upgrade)
    }

    pub fn live_scopes(&self) -> usize {
        let registries = self.registries.lock().expect("registry pool lock poisoned");
        registries
            .values()
            .filter(|registry| registry.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn album(key: &str) -> Album {
        Album::new(AlbumKey::new(key).unwrap(), key.to_uppercase())
    }

    fn key(value: &str) -> AlbumKey {
        AlbumKey::new(value).unwrap()
    }

    #[test]
    fn test_pool_shares_one_registry_per_scope_and_drops_with_last_handle() {
        let pool = RegistryPool::new();
        let scope = LibraryScope::new("main");
        let first = pool.acquire(&scope);
        let second = pool.acquire(&scope);
        assert!(Arc::ptr_eq(&first, &second));

        first.add_albums(vec![album("a")]);
        assert!(second.contains(&key("a")));

        let other = pool.acquire(&LibraryScope::new("other"));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(pool.live_scopes(), 2);

        drop(first);
        assert!(pool.get(&scope).is_some());
        drop(second);
        assert!(pool.get(&scope).is_none());

        let recreated = pool.acquire(&scope);
        assert_eq!(recreated.album_count(), 0);
        drop(other);
        assert_eq!(pool.live_scopes(), 1);
    }

    #[test]
    fn test_mutations_fan_out_to_every_subscriber() {
        let pool = RegistryPool::new();
        let registry = pool.acquire(&LibraryScope::new("fanout"));
        let mut first = registry.subscribe();
        let mut second = registry.subscribe();

        registry.add_albums(vec![album("a"), album("b")]);
        registry.refresh(&[key("a")]);
        registry.remove_albums(&[key("b"), key("missing")]);

        for receiver in [&mut first, &mut second] {
            assert_eq!(
                receiver.try_recv().unwrap(),
                RegistryEvent::AlbumsAdded(vec![key("a"), key("b")])
            );
            assert_eq!(
                receiver.try_recv().unwrap(),
                RegistryEvent::AlbumsChanged(vec![key("a")])
            );
            assert_eq!(
                receiver.try_recv().unwrap(),
                RegistryEvent::AlbumsRemoved(vec![key("b")])
            );
        }
    }

    #[test]
    fn test_upsert_keeps_cover_state() {
        let registry = RegistryPool::new().acquire(&LibraryScope::new("upsert"));
        registry.add_albums(vec![album("a")]);
        assert_eq!(registry.write_cover(&key("a"), 0, None), CoverWrite::Applied);

        let mut renamed = album("a");
        renamed.title = "Renamed".to_string();
        registry.add_albums(vec![renamed]);

        let stored = registry.album(&key("a")).unwrap();
        assert_eq!(stored.title, "Renamed");
        assert!(stored.is_scanned());
    }

    #[test]
    fn test_mark_unscanned_makes_older_cover_writes_stale() {
        let registry = RegistryPool::new().acquire(&LibraryScope::new("stale"));
        registry.add_albums(vec![album("a")]);
        let issued_generation = registry.cover_generation(&key("a")).unwrap();

        assert_eq!(registry.mark_unscanned(&[key("a"), key("zz")]), vec![key("a")]);
        assert_eq!(
            registry.write_cover(&key("a"), issued_generation, None),
            CoverWrite::Stale
        );
        assert!(!registry.album(&key("a")).unwrap().is_scanned());

        let current = registry.cover_generation(&key("a")).unwrap();
        assert_eq!(registry.write_cover(&key("a"), current, None), CoverWrite::Applied);
        assert_eq!(
            registry.write_cover(&key("gone"), current, None),
            CoverWrite::Missing
        );
    }

    #[test]
    fn test_reads_stay_valid_while_another_handle_is_released() {
        let pool = Arc::new(RegistryPool::new());
        let scope = LibraryScope::new("threads");
        let registry = pool.acquire(&scope);
        registry.add_albums((0..50).map(|index| album(&format!("k{index}"))).collect());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handle = pool.acquire(&scope);
                thread::spawn(move || {
                    let count = handle.album_count();
                    drop(handle);
                    count
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), 50);
        }
        assert_eq!(registry.album_count(), 50);
    }
}
