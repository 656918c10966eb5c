//! Cover-grid browser view.
//!
//! A view owns its visible row list (filtered, then sorted), its selection,
//! its render caches and its cover loader. Album data lives in the registry
//! shared with every other view of the same library; changes made there reach
//! this view through [`CoverGridBrowser::sync_registry_events`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::album::{AlbumKey, CoverImage, GridRow, RowId, Song};
use crate::album_text::{all_albums_text, AlbumFormatter, PatternFormatter};
use crate::config::{BrowserConfig, DisplaySettings};
use crate::cover_loader::{CompletionOutcome, CoverDecoder, CoverLoadCoordinator};
use crate::filter::{
    BackgroundFilterSource, FilterChange, FilterComposer, NoBackgroundFilter, QueryCompiler,
    QueryError,
};
use crate::image_pipeline::{add_border, placeholder_cover};
use crate::ordering::{sort_rows, SortCriterion};
use crate::protocol::{BrowserEvent, RegistryEvent, SelectionChanged};
use crate::query::SimpleQueryCompiler;
use crate::registry::{LibraryScope, RegistryHandle, RegistryPool};
use crate::render_cache::RenderCache;
use crate::selection::{
    deserialize_selection, serialize_selection, SelectionInhibitor, SelectionSnapshot,
};

const BROWSER_EVENT_CAPACITY: usize = 256;

/// External collaborators a view is built with.
#[derive(Clone)]
pub struct BrowserDeps {
    pub query_compiler: Arc<dyn QueryCompiler>,
    pub background_filter: Arc<dyn BackgroundFilterSource>,
    pub cover_decoder: Arc<dyn CoverDecoder>,
}

impl BrowserDeps {
    /// Default query language and no background scope.
    pub fn new(cover_decoder: Arc<dyn CoverDecoder>) -> Self {
        Self {
            query_compiler: Arc::new(SimpleQueryCompiler),
            background_filter: Arc::new(NoBackgroundFilter),
            cover_decoder,
        }
    }

    pub fn with_background_filter(mut self, source: Arc<dyn BackgroundFilterSource>) -> Self {
        self.background_filter = source;
        self
    }
}

/// Image shown in a cover cell. Equality is identity of the shared pixels.
#[derive(Debug, Clone)]
pub enum CellImage {
    Blank,
    Placeholder(Arc<CoverImage>),
    Cover(Arc<CoverImage>),
}

impl CellImage {
    pub fn image(&self) -> Option<&CoverImage> {
        match self {
            Self::Blank => None,
            Self::Placeholder(image) | Self::Cover(image) => Some(image),
        }
    }
}

impl PartialEq for CellImage {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Blank, Self::Blank) => true,
            (Self::Placeholder(left), Self::Placeholder(right))
            | (Self::Cover(left), Self::Cover(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }
}

/// Drawing target for one grid cell.
pub trait CellSurface {
    fn set_image(&mut self, image: &CellImage);
    fn set_markup(&mut self, markup: &str);
}

pub struct CoverGridBrowser {
    view_id: Uuid,
    registry: RegistryHandle,
    registry_events: broadcast::Receiver<RegistryEvent>,
    events: broadcast::Sender<BrowserEvent>,
    deps: BrowserDeps,
    formatter: Arc<dyn AlbumFormatter>,
    pattern_text: String,
    composer: FilterComposer,
    search_text: String,
    sort_criterion: SortCriterion,
    display: DisplaySettings,
    rows: Vec<RowId>,
    row_index: HashMap<RowId, usize>,
    selection: HashSet<RowId>,
    cursor: Option<RowId>,
    inhibitor: SelectionInhibitor,
    covers: CoverLoadCoordinator,
    placeholder: Arc<CoverImage>,
    image_cache: RenderCache<CellImage>,
    text_cache: RenderCache<String>,
}

impl CoverGridBrowser {
    /// Attaches a new view to the registry of `scope`, creating it if needed.
    pub fn new(
        pool: &RegistryPool,
        scope: &LibraryScope,
        deps: BrowserDeps,
        config: &BrowserConfig,
    ) -> Self {
        let registry = pool.acquire(scope);
        let registry_events = registry.subscribe();
        let (events, _) = broadcast::channel(BROWSER_EVENT_CAPACITY);
        let covers = CoverLoadCoordinator::new(registry.clone(), deps.cover_decoder.clone());
        let mut composer = FilterComposer::new();
        composer.set_background(deps.background_filter.background_filter());

        let mut browser = Self {
            view_id: Uuid::new_v4(),
            registry,
            registry_events,
            events,
            formatter: Arc::new(PatternFormatter::new(&config.album_pattern)),
            pattern_text: config.album_pattern.clone(),
            deps,
            composer,
            search_text: String::new(),
            sort_criterion: config.sort_criterion,
            display: config.display_settings().clamped(),
            rows: Vec::new(),
            row_index: HashMap::new(),
            selection: HashSet::new(),
            cursor: None,
            inhibitor: SelectionInhibitor::default(),
            covers,
            placeholder: Arc::new(placeholder_cover(config.cover_size_px)),
            image_cache: RenderCache::new(),
            text_cache: RenderCache::new(),
        };
        browser.rebuild_rows();
        info!(
            "Browser: view created id={} scope={} albums={}",
            browser.view_id,
            scope,
            browser.registry.album_count()
        );
        browser
    }

    pub fn view_id(&self) -> Uuid {
        self.view_id
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.events.subscribe()
    }

    /// Replaces the album text collaborator for this view only.
    pub fn set_formatter(&mut self, formatter: Arc<dyn AlbumFormatter>) {
        self.formatter = formatter;
        self.invalidate_text();
    }

    pub fn visible_rows(&self) -> &[RowId] {
        &self.rows
    }

    pub fn row_position(&self, row: &RowId) -> Option<usize> {
        self.row_index.get(row).copied()
    }

    pub fn sort_criterion(&self) -> SortCriterion {
        self.sort_criterion
    }

    pub fn display_settings(&self) -> DisplaySettings {
        self.display
    }

    /// Text currently in the search box, parsable or not.
    pub fn query_text(&self) -> &str {
        &self.search_text
    }

    pub fn cursor(&self) -> Option<&RowId> {
        self.cursor.as_ref()
    }

    fn visible_album_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    fn emit(&self, event: BrowserEvent) {
        // No receivers just means nothing listens to this view yet.
        let _ = self.events.send(event);
    }

    fn rebuild_rows(&mut self) {
        let before = self.selection_signature();
        let criterion = self.sort_criterion;
        let composer = &self.composer;
        let rows: Vec<RowId> = self.registry.read(|index| {
            let mut rows: Vec<GridRow<'_>> = std::iter::once(GridRow::AllAlbums)
                .chain(index.iter().map(GridRow::Album))
                .filter(|row| composer.is_visible(*row))
                .collect();
            sort_rows(criterion, &mut rows);
            rows.into_iter().map(GridRow::id).collect()
        });
        self.row_index = rows
            .iter()
            .enumerate()
            .map(|(position, row)| (row.clone(), position))
            .collect();
        self.rows = rows;

        let row_index = &self.row_index;
        self.selection.retain(|row| row_index.contains_key(row));
        if self
            .cursor
            .as_ref()
            .is_some_and(|cursor| !row_index.contains_key(cursor))
        {
            self.cursor = None;
        }
        if self.selection_signature() != before {
            self.notify_selection_changed();
        }
    }

    /// Runs `f` with selection notifications held back, then sends at most one.
    fn with_selection_batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let before = self.selection_signature();
        self.inhibitor.inhibit();
        let result = f(self);
        if self.inhibitor.release() && self.selection_signature() != before {
            self.emit_selection_changed();
        }
        result
    }

    fn refilter(&mut self) {
        self.with_selection_batch(Self::rebuild_rows);
        debug!(
            "Browser: refiltered id={} visible_albums={}",
            self.view_id,
            self.visible_album_count()
        );
        self.emit(BrowserEvent::VisibilityRecheck);
    }

    /// Re-sorts the visible rows; membership is unchanged.
    pub fn set_sort_criterion(&mut self, criterion: SortCriterion) {
        if criterion == self.sort_criterion {
            return;
        }
        self.sort_criterion = criterion;
        self.with_selection_batch(Self::rebuild_rows);
        debug!(
            "Browser: sorted id={} criterion={}",
            self.view_id,
            criterion.label()
        );
    }

    /// Applies new search text and recomputes the background scope.
    ///
    /// Unparsable text is returned as an error and the previous query stays active.
    pub fn update_query(&mut self, text: &str) -> Result<(), QueryError> {
        self.search_text = text.to_string();
        self.composer
            .set_query(text, self.deps.query_compiler.as_ref())?;
        let background = self.deps.background_filter.background_filter();
        self.composer.set_background(background);
        self.refilter();
        Ok(())
    }

    /// Re-reads the background scope; the user query is left alone.
    pub fn refresh_background_filter(&mut self) {
        let background = self.deps.background_filter.background_filter();
        if self.composer.set_background(background) == FilterChange::RecheckAll {
            self.refilter();
        }
    }

    /// Programmatic search: applies `text`, puts the cursor on the first row
    /// and announces the selection. Returns false for unparsable text.
    pub fn filter_text(&mut self, text: &str) -> bool {
        self.search_text = text.to_string();
        if !self.deps.query_compiler.is_parsable(text) {
            debug!("Browser: ignoring unparsable filter text {:?}", text);
            return false;
        }
        // Intermediate changes are dropped; activate() announces the result.
        self.inhibitor.inhibit();
        let applied = self.update_query(text).is_ok();
        if applied {
            self.set_cursor_to_first_row();
        }
        self.inhibitor.release();
        if applied {
            self.activate();
        }
        applied
    }

    pub fn unfilter(&mut self) {
        self.filter_text("");
        self.set_cursor_to_first_row();
    }

    fn set_cursor_to_first_row(&mut self) {
        if let Some(first) = self.rows.first().cloned() {
            self.select_only(first);
        }
    }

    /// Numeric tags and plain titles are not useful album filters.
    pub fn can_filter_key(&self, key: Option<&str>) -> bool {
        !key.is_some_and(|key| key.starts_with("~#") || key == "title")
    }

    /// Keys of the visible albums in view order.
    pub fn list_albums(&self) -> Vec<AlbumKey> {
        self.rows
            .iter()
            .filter_map(|row| row.album_key().cloned())
            .collect()
    }

    /// Selects exactly the visible albums in `keys`. Returns true if the selection changed.
    pub fn filter_albums(&mut self, keys: &[AlbumKey]) -> bool {
        let wanted: HashSet<&AlbumKey> = keys.iter().collect();
        let rows: Vec<RowId> = self
            .rows
            .iter()
            .filter(|row| row.album_key().is_some_and(|key| wanted.contains(key)))
            .cloned()
            .collect();
        let before = self.selection_signature();
        self.with_selection_batch(|view| view.select_rows(&rows));
        self.selection_signature() != before
    }

    /// Selects the album holding `song`, if it is visible.
    pub fn select_album_of_song(&mut self, song: &Song) -> bool {
        let rows = &self.rows;
        let found = self.registry.read(|index| {
            rows.iter()
                .find(|row| {
                    row.album_key()
                        .and_then(|key| index.get(key))
                        .is_some_and(|album| album.contains_song(song))
                })
                .cloned()
        });
        match found {
            Some(row) => {
                self.select_only(row);
                true
            }
            None => false,
        }
    }

    fn select_only(&mut self, row: RowId) {
        self.select_rows(std::slice::from_ref(&row));
        self.cursor = Some(row);
    }

    /// Replaces the selection with the visible rows among `rows`.
    pub fn select_rows(&mut self, rows: &[RowId]) {
        let before = self.selection_signature();
        self.selection = rows
            .iter()
            .filter(|row| self.row_index.contains_key(*row))
            .cloned()
            .collect();
        if self.selection_signature() != before {
            self.notify_selection_changed();
        }
    }

    pub fn is_selected(&self, row: &RowId) -> bool {
        self.selection.contains(row)
    }

    /// Selected album keys in view order; the "all albums" row expands to every visible album.
    pub fn selected_albums(&self) -> Vec<AlbumKey> {
        if self.selection.contains(&RowId::AllAlbums) {
            return self.list_albums();
        }
        self.rows
            .iter()
            .filter(|row| self.selection.contains(*row))
            .filter_map(|row| row.album_key().cloned())
            .collect()
    }

    /// Songs of the selected albums in view order, optionally sorted within each album.
    pub fn selected_songs(&self, sort: bool) -> Vec<Song> {
        let keys = self.selected_albums();
        self.registry.read(|index| {
            let mut songs = Vec::new();
            for album in keys.iter().filter_map(|key| index.get(key)) {
                if sort {
                    songs.extend(album.sorted_songs().into_iter().cloned());
                } else {
                    songs.extend(album.songs.iter().cloned());
                }
            }
            songs
        })
    }

    /// True if `song` belongs to one of the selected albums.
    pub fn active_filter(&self, song: &Song) -> bool {
        let keys = self.selected_albums();
        self.registry.read(|index| {
            keys.iter()
                .filter_map(|key| index.get(key))
                .any(|album| album.contains_song(song))
        })
    }

    /// Announces the current selection to the song list.
    pub fn activate(&mut self) {
        self.notify_selection_changed();
    }

    fn notify_selection_changed(&mut self) {
        if self.inhibitor.notify() {
            self.emit_selection_changed();
        }
    }

    fn emit_selection_changed(&self) {
        let selection = SelectionChanged {
            all_albums: self.selection.contains(&RowId::AllAlbums),
            album_keys: self.selected_albums(),
        };
        debug!(
            "Browser: selection changed id={} all={} albums={}",
            self.view_id,
            selection.all_albums,
            selection.album_keys.len()
        );
        self.emit(BrowserEvent::SelectionChanged(selection));
    }

    fn selection_signature(&self) -> (bool, BTreeSet<AlbumKey>) {
        (
            self.selection.contains(&RowId::AllAlbums),
            self.selected_albums().into_iter().collect(),
        )
    }

    /// Selection in its persisted form.
    pub fn selection_snapshot(&self) -> SelectionSnapshot {
        if self.selection.contains(&RowId::AllAlbums) {
            return SelectionSnapshot::AllAlbums;
        }
        SelectionSnapshot::Albums(self.selected_albums())
    }

    /// Albums in `displayed` (row positions) whose cover has not been loaded or requested.
    pub fn rows_needing_cover(&self, displayed: Range<usize>) -> Vec<AlbumKey> {
        let end = displayed.end.min(self.rows.len());
        let start = displayed.start.min(end);
        let rows = &self.rows[start..end];
        self.registry.read(|index| {
            rows.iter()
                .filter_map(RowId::album_key)
                .filter(|key| !self.covers.is_loading(key))
                .filter(|key| index.get(key).is_some_and(|album| !album.is_scanned()))
                .cloned()
                .collect()
        })
    }

    /// Issues loads for displayed rows still without a cover. Returns how many were issued.
    pub fn request_visible_covers(&mut self, displayed: Range<usize>, scale_factor: f64) -> usize {
        let mut issued = 0;
        for key in self.rows_needing_cover(displayed) {
            if self.covers.request_load(&key, scale_factor, false) {
                issued += 1;
            }
        }
        issued
    }

    /// Settles finished cover loads and returns the visible rows to redraw.
    pub fn process_cover_completions(&mut self) -> Vec<RowId> {
        let outcomes = self.covers.process_completions();
        self.mark_loaded_rows_dirty(outcomes)
    }

    /// Like [`Self::process_cover_completions`], waiting up to `timeout` for one load.
    pub fn wait_for_cover_completion(&mut self, timeout: Duration) -> Option<Vec<RowId>> {
        let outcome = self.covers.wait_for_completion(timeout)?;
        let mut outcomes = vec![outcome];
        outcomes.extend(self.covers.process_completions());
        Some(self.mark_loaded_rows_dirty(outcomes))
    }

    pub fn pending_cover_loads(&self) -> usize {
        self.covers.pending_count()
    }

    fn mark_loaded_rows_dirty(&self, outcomes: Vec<CompletionOutcome>) -> Vec<RowId> {
        let dirty: Vec<RowId> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                CompletionOutcome::Applied(key) => Some(RowId::Album(key)),
                _ => None,
            })
            .filter(|row| self.row_index.contains_key(row))
            .collect();
        if !dirty.is_empty() {
            self.emit(BrowserEvent::RowsDirty(dirty.clone()));
        }
        dirty
    }

    /// Reloads the covers of the selected albums in every view of this library.
    pub fn refresh_selected_covers(&mut self) -> Vec<AlbumKey> {
        let keys = self.selected_albums();
        let marked = self.registry.mark_unscanned(&keys);
        info!(
            "Browser: cover refresh id={} albums={}",
            self.view_id,
            marked.len()
        );
        self.registry.refresh(&marked);
        marked
    }

    /// Draws the cover cell of `row`. Returns true if the surface was written.
    pub fn render_cover_cell(&mut self, row: &RowId, surface: &mut dyn CellSurface) -> bool {
        let image = match row {
            RowId::AllAlbums => CellImage::Blank,
            RowId::Album(key) => {
                let cover = self
                    .registry
                    .read(|index| index.get(key).map(|album| album.cover().cloned()));
                match cover {
                    None => return false,
                    Some(Some(cover)) => {
                        let bordered =
                            CellImage::Cover(Arc::new(add_border(&cover, self.display.round_covers)));
                        self.image_cache
                            .apply_uncached(&bordered, |image| surface.set_image(image));
                        return true;
                    }
                    Some(None) => CellImage::Placeholder(self.placeholder.clone()),
                }
            }
        };
        self.image_cache
            .apply_if_changed(&image, |image| surface.set_image(image))
    }

    /// Draws the text cell of `row` unless album text is hidden.
    pub fn render_text_cell(&mut self, row: &RowId, surface: &mut dyn CellSurface) -> bool {
        if !self.display.show_album_text {
            return false;
        }
        let Some(markup) = self.markup_for(row) else {
            return false;
        };
        self.text_cache
            .apply_if_changed(&markup, |markup| surface.set_markup(markup))
    }

    pub fn tooltip_text(&self, row: &RowId) -> Option<String> {
        self.markup_for(row)
    }

    fn markup_for(&self, row: &RowId) -> Option<String> {
        match row {
            RowId::AllAlbums => Some(all_albums_text(self.visible_album_count())),
            RowId::Album(key) => {
                let formatter = &self.formatter;
                self.registry
                    .read(|index| index.get(key).map(|album| formatter.format_album(album)))
            }
        }
    }

    fn invalidate_text(&mut self) {
        self.text_cache.invalidate();
        if !self.rows.is_empty() {
            self.emit(BrowserEvent::RowsDirty(self.rows.clone()));
        }
    }

    /// Pushes layout and drawing preferences to every view of this library.
    pub fn apply_display_settings(&mut self, settings: DisplaySettings) {
        let settings = settings.clamped();
        self.set_display(settings);
        self.registry.publish_display_settings(settings);
    }

    fn set_display(&mut self, settings: DisplaySettings) {
        if settings == self.display {
            return;
        }
        self.display = settings;
        self.image_cache.invalidate();
        self.text_cache.invalidate();
        self.emit(BrowserEvent::DisplaySettingsChanged(settings));
    }

    /// Changes the album text pattern of every view of this library.
    pub fn set_album_pattern(&mut self, pattern: &str) -> bool {
        if !self.set_pattern(pattern) {
            return false;
        }
        self.registry.publish_pattern(pattern);
        true
    }

    fn set_pattern(&mut self, pattern: &str) -> bool {
        if pattern == self.pattern_text {
            return false;
        }
        self.pattern_text = pattern.to_string();
        self.formatter = Arc::new(PatternFormatter::new(pattern));
        self.invalidate_text();
        true
    }

    /// Applies pending registry notifications. Returns how many were handled.
    pub fn sync_registry_events(&mut self) -> usize {
        let mut handled = 0;
        let mut needs_rebuild = false;
        let mut changed: Vec<AlbumKey> = Vec::new();
        loop {
            match self.registry_events.try_recv() {
                Ok(event) => {
                    handled += 1;
                    match event {
                        RegistryEvent::AlbumsAdded(_) | RegistryEvent::AlbumsRemoved(_) => {
                            needs_rebuild = true;
                        }
                        RegistryEvent::AlbumsChanged(keys) => {
                            needs_rebuild = true;
                            changed.extend(keys);
                        }
                        RegistryEvent::DisplaySettingsChanged(settings) => {
                            self.set_display(settings);
                        }
                        RegistryEvent::PatternChanged(pattern) => {
                            self.set_pattern(&pattern);
                        }
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(
                        "Browser: registry events lagged id={} skipped={}",
                        self.view_id, skipped
                    );
                    needs_rebuild = true;
                    changed.extend(self.list_albums());
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }

        if needs_rebuild {
            self.with_selection_batch(Self::rebuild_rows);
        }
        let dirty: Vec<RowId> = changed
            .into_iter()
            .map(RowId::Album)
            .filter(|row| self.row_index.contains_key(row))
            .collect();
        if !dirty.is_empty() {
            self.text_cache.invalidate();
            self.emit(BrowserEvent::RowsDirty(dirty));
        }
        handled
    }

    /// Writes the view state that survives a restart.
    pub fn save(&self, config: &mut BrowserConfig) {
        config.selected_albums = serialize_selection(&self.selection_snapshot());
        config.query_text = self.search_text.clone();
        config.sort_criterion = self.sort_criterion;
        config.album_pattern = self.pattern_text.clone();
        config.set_display_settings(self.display);
    }

    /// Restores search text and selection, announcing the selection at most once.
    pub fn restore(&mut self, config: &BrowserConfig) {
        self.with_selection_batch(|view| {
            view.restore_query(&config.query_text);
            let registry = view.registry.clone();
            let snapshot =
                deserialize_selection(&config.selected_albums, |key| registry.contains(key));
            match snapshot {
                SelectionSnapshot::Albums(keys)
                    if keys
                        .iter()
                        .any(|key| view.row_index.contains_key(&RowId::Album(key.clone()))) =>
                {
                    let rows: Vec<RowId> = keys.into_iter().map(RowId::Album).collect();
                    view.select_rows(&rows);
                    view.cursor = rows.into_iter().find(|row| view.row_index.contains_key(row));
                }
                // Nothing persisted is still visible.
                _ => view.select_only(RowId::AllAlbums),
            }
        });
        debug!(
            "Browser: restored id={} query={:?} selected={}",
            self.view_id,
            self.search_text,
            self.selection.len()
        );
    }

    fn restore_query(&mut self, text: &str) {
        self.search_text = text.to_string();
        if !self.deps.query_compiler.is_parsable(text) {
            return;
        }
        let was_unrestricted = self.composer.is_unrestricted();
        let Ok(query_change) = self
            .composer
            .set_query(text, self.deps.query_compiler.as_ref())
        else {
            return;
        };
        let background = self.deps.background_filter.background_filter();
        let background_change = self.composer.set_background(background);
        let unchanged = query_change == FilterChange::Unchanged
            && background_change == FilterChange::Unchanged;
        // The current rows already match the composer.
        if unchanged || (was_unrestricted && self.composer.is_unrestricted()) {
            return;
        }
        self.refilter();
    }
}

impl Drop for CoverGridBrowser {
    fn drop(&mut self) {
        self.covers.cancel();
        info!(
            "Browser: view destroyed id={} scope={} pending_covers={}",
            self.view_id,
            self.registry.scope(),
            self.covers.pending_count()
        );
    }
}
