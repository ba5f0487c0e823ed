//! One open slide: viewport, tiles, annotations and the overlay kept in sync.
//!
//! Every mutation goes through [`SlideSession`], which commits it to the owning
//! component and publishes the resulting event on the bus. Rendering happens in
//! [`SlideSession::pump`], once per frame, from whatever the bus collected.

use std::collections::VecDeque;

use crate::config::{SlideDescriptor, ViewerConfig};
use crate::constants::{MAX_NOTICES, POLYGON_CLOSE_DISTANCE};
use crate::error::{RepositoryError, SessionError, ViewportError};
use crate::events::{EventBus, FrameUpdate, Listener, SessionEvent, SubscriptionId};
use crate::export::{ExportError, ExportRegistry, ExportSource};
use crate::model::{
    Annotation, AnnotationId, AnnotationPatch, AnnotationTool, DrawingState, Geometry, LabelSchema, Point,
    Timestamp, now_millis,
};
use crate::overlay::{OverlayEngine, OverlayFrame};
use crate::pyramid::{RendererStats, TileCache, TileFetcher, TileFrame, TileRenderer, UrlTileSource};
use crate::repository::AnnotationRepository;
use crate::store::{AnnotationStore, StoreEvent, UpdateOutcome};
use crate::viewport::{ScreenPoint, ScreenSize, Viewport, ViewportChange, ViewportEvent, ViewportState};

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: Timestamp,
}

/// Pointer gestures in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Down(ScreenPoint),
    Move(ScreenPoint),
    Up(ScreenPoint),
    /// Close the polygon being drawn (Enter / double click)
    FinishPolygon,
    /// Abandon the current gesture (Escape)
    Cancel,
}

/// Output of one [`SlideSession::pump`].
#[derive(Debug, Clone, Default)]
pub struct SessionFrame {
    /// Frame counter, starting at 1
    pub frame: u64,
    pub update: FrameUpdate,
    /// Tile layer draw list, when it needs repainting
    pub tiles: Option<TileFrame>,
    /// Annotation layer, when it needs repainting
    pub overlay: Option<OverlayFrame>,
}

impl SessionFrame {
    pub fn is_idle(&self) -> bool {
        self.tiles.is_none() && self.overlay.is_none()
    }
}

/// A slide opened for viewing and annotation.
pub struct SlideSession {
    slide: SlideDescriptor,
    viewport: Viewport,
    store: AnnotationStore,
    renderer: TileRenderer,
    overlay: OverlayEngine,
    bus: EventBus,
    drawing: DrawingState,
    notices: VecDeque<Notice>,
    /// The drawing preview changed outside the bus
    preview_dirty: bool,
    frames: u64,
}

impl SlideSession {
    /// Open `slide` fitted to `container`, fetching tiles through `fetcher`.
    pub fn open(
        slide: SlideDescriptor,
        config: &ViewerConfig,
        container: ScreenSize,
        fetcher: Box<dyn TileFetcher>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        slide.plane.validate()?;

        let viewport = Viewport::new(slide.plane.extent(), container, config.zoom)?;
        let source = UrlTileSource::new(slide.plane.clone(), slide.tile_base_url.clone())
            .with_template(config.tiles.url_template.clone())
            .with_format(config.tiles.format.clone());
        let cache = TileCache::new(config.cache.max_tiles, config.cache.max_bytes);
        let mut renderer = TileRenderer::new(Box::new(source), fetcher, cache);
        renderer.on_viewport(&viewport.state());

        let mut bus = EventBus::new(config.event_queue_capacity);
        let initial = ViewportEvent {
            revision: viewport.revision(),
            change: ViewportChange::Fit,
            state: viewport.state(),
        };
        bus.publish(SessionEvent::Viewport(initial));

        log::info!(
            "Opened slide {:?} ({}x{}) in a {}x{} container at zoom {:.4}",
            slide.name.as_deref().unwrap_or("<unnamed>"),
            slide.plane.width,
            slide.plane.height,
            container.width,
            container.height,
            viewport.zoom()
        );

        Ok(Self {
            slide,
            viewport,
            store: AnnotationStore::new(),
            renderer,
            overlay: OverlayEngine::new(config.overlay.clone()),
            bus,
            drawing: DrawingState::default(),
            notices: VecDeque::new(),
            preview_dirty: false,
            frames: 0,
        })
    }

    pub fn slide(&self) -> &SlideDescriptor {
        &self.slide
    }

    /// Key used for persistence and export file names.
    pub fn slide_key(&self) -> &str {
        self.slide.name.as_deref().unwrap_or("slide")
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.slide.schema
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn state(&self) -> ViewportState {
        self.viewport.state()
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn drawing(&self) -> &DrawingState {
        &self.drawing
    }

    pub fn renderer_stats(&self) -> RendererStats {
        self.renderer.stats()
    }

    /// No events queued and no tile fetches outstanding.
    pub fn is_settled(&self) -> bool {
        self.bus.pending() == 0 && self.renderer.pending() == 0
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // --- Notices ---

    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info => log::info!("{}", message),
            NoticeLevel::Warning => log::warn!("{}", message),
            NoticeLevel::Error => log::error!("{}", message),
        }
        if self.notices.len() >= MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            level,
            message,
            at: now_millis(),
        });
    }

    /// Take all pending notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    // --- Viewport ---

    fn commit_view(&mut self, result: Result<ViewportEvent, ViewportError>) -> Result<ViewportEvent, ViewportError> {
        let event = result?;
        self.bus.publish(SessionEvent::Viewport(event));
        Ok(event)
    }

    pub fn pan(&mut self, delta: Point) -> Result<ViewportEvent, ViewportError> {
        let result = self.viewport.pan(delta);
        self.commit_view(result)
    }

    /// Drag the image by a screen-space offset.
    pub fn pan_by_screen(&mut self, dx: f64, dy: f64) -> Result<ViewportEvent, ViewportError> {
        let result = self.viewport.pan_by_screen(dx, dy);
        self.commit_view(result)
    }

    pub fn zoom_to(&mut self, zoom: f64, anchor: ScreenPoint) -> Result<ViewportEvent, ViewportError> {
        let result = self.viewport.zoom_to(zoom, anchor);
        self.commit_view(result)
    }

    /// Wheel zoom: positive steps zoom in around `anchor`.
    pub fn zoom_steps(&mut self, steps: i32, anchor: ScreenPoint) -> Result<ViewportEvent, ViewportError> {
        let result = self.viewport.zoom_steps(steps, anchor);
        self.commit_view(result)
    }

    pub fn rotate(&mut self, degrees: f64) -> Result<ViewportEvent, ViewportError> {
        let result = self.viewport.rotate(degrees);
        self.commit_view(result)
    }

    pub fn set_rotation(&mut self, degrees: f64) -> Result<ViewportEvent, ViewportError> {
        let result = self.viewport.set_rotation(degrees);
        self.commit_view(result)
    }

    /// Fit the whole slide into the current container.
    pub fn fit(&mut self) -> Result<ViewportEvent, ViewportError> {
        let container = self.viewport.state().container;
        let result = self.viewport.fit_to_container(container);
        self.commit_view(result)
    }

    pub fn resize(&mut self, container: ScreenSize) -> Result<ViewportEvent, ViewportError> {
        let result = self.viewport.set_container_size(container);
        self.commit_view(result)
    }

    // --- Store ---

    fn commit_store(&mut self, event: Option<StoreEvent>) -> Option<StoreEvent> {
        if let Some(event) = &event {
            self.bus.publish(SessionEvent::Store(event.clone()));
        }
        event
    }

    pub fn set_annotations(&mut self, annotations: Vec<Annotation>) -> StoreEvent {
        let event = self.store.set_all(annotations);
        self.bus.publish(SessionEvent::Store(event.clone()));
        event
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> Option<StoreEvent> {
        match self.store.add(annotation) {
            Ok(event) => self.commit_store(Some(event)),
            Err(e) => {
                self.notify(NoticeLevel::Warning, format!("Annotation not added: {}", e));
                None
            }
        }
    }

    pub fn update_annotation(&mut self, id: AnnotationId, patch: AnnotationPatch) -> UpdateOutcome {
        let outcome = self.store.update(id, patch);
        if let UpdateOutcome::Updated(event) = &outcome {
            self.bus.publish(SessionEvent::Store(event.clone()));
        }
        outcome
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> Option<Annotation> {
        let (removed, event) = self.store.remove(id)?;
        self.commit_store(Some(event));
        log::info!("🗑️ Deleted annotation {}", id);
        Some(removed)
    }

    pub fn delete_selected(&mut self) -> Option<Annotation> {
        let id = self.store.selected()?;
        self.remove_annotation(id)
    }

    pub fn select(&mut self, id: Option<AnnotationId>) -> Option<StoreEvent> {
        let event = self.store.select(id);
        self.commit_store(event)
    }

    /// Switch tools, abandoning any gesture in progress.
    pub fn set_active_tool(&mut self, tool: AnnotationTool) -> Option<StoreEvent> {
        self.cancel_drawing();
        let event = self.store.set_active_tool(tool);
        log::debug!("🖌️ Annotation tool: {:?}", tool);
        self.commit_store(event)
    }

    pub fn set_active_label(&mut self, label: impl Into<String>) -> Option<StoreEvent> {
        let label = label.into();
        if self.slide.schema.resolve(&label).is_none() && !self.slide.schema.classes().is_empty() {
            log::warn!("Label '{}' is not part of schema '{}'", label, self.slide.schema.name);
        }
        let event = self.store.set_active_label(label);
        self.commit_store(event)
    }

    pub fn set_active_color(&mut self, color: impl Into<String>) -> Option<StoreEvent> {
        let event = self.store.set_active_color(color);
        self.commit_store(event)
    }

    // --- Tools ---

    /// Route a pointer gesture to the active tool.
    pub fn handle_pointer(&mut self, input: PointerInput) {
        let tool = self.store.active_tool();
        match input {
            PointerInput::Down(at) => self.pointer_down(tool, at),
            PointerInput::Move(at) => {
                if self.drawing.is_drawing() {
                    self.drawing.drag(self.viewport.screen_to_image(at));
                    self.preview_dirty = true;
                }
            }
            PointerInput::Up(at) => {
                // Polygons keep collecting clicks until closed explicitly
                if matches!(tool, AnnotationTool::Rectangle | AnnotationTool::Freehand) && self.drawing.is_drawing() {
                    self.drawing.drag(self.viewport.screen_to_image(at));
                    self.finish_drawing();
                }
            }
            PointerInput::FinishPolygon => {
                if tool == AnnotationTool::Polygon {
                    self.finish_drawing();
                }
            }
            PointerInput::Cancel => self.cancel_drawing(),
        }
    }

    fn pointer_down(&mut self, tool: AnnotationTool, at: ScreenPoint) {
        let image = self.viewport.screen_to_image(at);
        match tool {
            AnnotationTool::Select => {
                let hit = self.hit_test(at);
                self.select(hit);
                if let Some(id) = hit {
                    log::debug!("🔍 Selected annotation {}", id);
                }
            }
            AnnotationTool::Erase => {
                if let Some(id) = self.hit_test(at) {
                    self.remove_annotation(id);
                }
            }
            AnnotationTool::Polygon if self.drawing.is_drawing() => {
                if self.closes_polygon(image) {
                    self.finish_drawing();
                } else {
                    self.drawing.add_vertex(image);
                    self.preview_dirty = true;
                }
            }
            AnnotationTool::Point | AnnotationTool::Polygon | AnnotationTool::Rectangle | AnnotationTool::Freehand => {
                if let Some(geometry) = self.drawing.begin(tool, image) {
                    self.create_annotation(geometry);
                } else {
                    log::debug!("✏️ Started {} at ({:.1}, {:.1})", tool.name(), image.x, image.y);
                }
                self.preview_dirty = true;
            }
        }
    }

    /// Click near the first vertex of a polygon with enough vertices.
    fn closes_polygon(&self, at: Point) -> bool {
        match &self.drawing {
            DrawingState::Path {
                vertices,
                freehand: false,
            } if vertices.len() >= 3 => vertices
                .first()
                .is_some_and(|first| first.distance_to(&at) < POLYGON_CLOSE_DISTANCE / self.viewport.zoom()),
            _ => false,
        }
    }

    /// Complete the current gesture and store the result if it is large enough.
    pub fn finish_drawing(&mut self) -> Option<AnnotationId> {
        let was_drawing = self.drawing.is_drawing();
        let geometry = self.drawing.finish(self.viewport.zoom());
        self.preview_dirty |= was_drawing;
        match geometry {
            Some(geometry) => self.create_annotation(geometry),
            None => {
                if was_drawing {
                    log::debug!("📝 Gesture too small, discarded");
                }
                None
            }
        }
    }

    pub fn cancel_drawing(&mut self) {
        if self.drawing.is_drawing() {
            self.drawing.cancel();
            self.preview_dirty = true;
            log::debug!("❌ Drawing cancelled");
        }
    }

    fn create_annotation(&mut self, geometry: Geometry) -> Option<AnnotationId> {
        if let Err(e) = geometry.validate() {
            self.notify(NoticeLevel::Warning, format!("Shape discarded: {}", e));
            return None;
        }
        let id = self.store.next_id();
        let kind = geometry.kind();
        match self.store.create(geometry, &self.slide.schema) {
            Ok(event) => {
                self.commit_store(Some(event));
                log::info!("✅ Created {} annotation {} ({})", kind, id, self.store.active_label());
                Some(id)
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, format!("Annotation not created: {}", e));
                None
            }
        }
    }

    /// Topmost interactive annotation under a screen position.
    pub fn hit_test(&self, at: ScreenPoint) -> Option<AnnotationId> {
        self.overlay
            .project(&self.viewport.state(), &self.store, &self.slide.schema)
            .hit_test(at)
    }

    // --- Frames ---

    /// Drain tile completions and queued events, then rebuild the dirty layers.
    pub fn pump(&mut self) -> SessionFrame {
        let tiles_arrived = self.renderer.receive();
        let update = self.bus.drain_frame();
        let state = self.viewport.state();

        if update.needs_tile_redraw() {
            self.renderer.on_viewport(&state);
        }

        let tiles = (update.needs_tile_redraw() || tiles_arrived).then(|| self.renderer.composite(&state));
        let overlay = (update.needs_overlay_redraw() || self.preview_dirty).then(|| {
            let mut frame = self.overlay.project(&state, &self.store, &self.slide.schema);
            frame.preview = self.overlay.project_preview(&state, &self.drawing);
            frame
        });
        self.preview_dirty = false;
        self.frames += 1;

        if let Some(tiles) = &tiles {
            log::trace!(
                "Frame {}: level {}, {} draws ({} placeholders), {} missing",
                self.frames,
                tiles.level,
                tiles.draws.len(),
                tiles.placeholders(),
                tiles.missing.len()
            );
        }

        SessionFrame {
            frame: self.frames,
            update,
            tiles,
            overlay,
        }
    }

    // --- Persistence and export ---

    /// Replace the annotations with those stored for this slide.
    ///
    /// A failing backend leaves the session with no annotations and a notice.
    pub fn load_annotations(&mut self, repository: &dyn AnnotationRepository) -> usize {
        let key = self.slide_key().to_string();
        let annotations = match repository.load(&key) {
            Ok(annotations) => annotations,
            Err(e) => {
                self.notify(NoticeLevel::Warning, format!("Could not load annotations: {}", e));
                Vec::new()
            }
        };
        let invalid = annotations.iter().filter(|a| a.geometry.validate().is_err()).count();
        if invalid > 0 {
            self.notify(
                NoticeLevel::Warning,
                format!("{} annotations have invalid geometry and will not be drawn", invalid),
            );
        }
        self.set_annotations(annotations);
        self.store.len()
    }

    pub fn save_annotations(&mut self, repository: &dyn AnnotationRepository) -> Result<(), RepositoryError> {
        let key = self.slide_key().to_string();
        let result = repository.save(&key, self.store.annotations());
        match &result {
            Ok(()) => self.notify(NoticeLevel::Info, format!("Saved {} annotations", self.store.len())),
            Err(e) => self.notify(NoticeLevel::Error, format!("Could not save annotations: {}", e)),
        }
        result
    }

    /// Render the current annotations with the exporter registered as `format`.
    pub fn export(&self, registry: &ExportRegistry, format: &str) -> Result<Vec<u8>, ExportError> {
        let exporter = registry.require(format)?;
        let source = ExportSource::new(self.slide_key(), &self.slide.plane, self.store.annotations());
        exporter.export_to_bytes(&source)
    }
}

impl std::fmt::Debug for SlideSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideSession")
            .field("slide", &self.slide_key())
            .field("viewport", &self.viewport.state())
            .field("annotations", &self.store.len())
            .field("renderer", &self.renderer)
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::TileError;
    use crate::model::Rect;
    use crate::pyramid::{ImagePlane, TileDescriptor, TileImage, TileRequest, TileResponse};
    use crate::store::StoreChange;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Completes every request on the next poll; tiles listed in `fail` error out.
    #[derive(Default)]
    struct InstantFetcher {
        queued: Vec<TileRequest>,
        fail: Vec<TileDescriptor>,
    }

    impl TileFetcher for InstantFetcher {
        fn request(&mut self, request: TileRequest) {
            self.queued.push(request);
        }

        fn cancel(&mut self, tile: TileDescriptor) {
            self.queued.retain(|r| r.tile != tile);
        }

        fn poll(&mut self) -> Vec<TileResponse> {
            self.queued
                .drain(..)
                .map(|r| {
                    let result = if self.fail.contains(&r.tile) {
                        Err(TileError::transport(r.tile, "HTTP 500"))
                    } else {
                        let (w, h) = (r.level_rect.width as u32, r.level_rect.height as u32);
                        Ok(TileImage::new(w, h, vec![0; (w * h * 4) as usize]))
                    };
                    TileResponse { tile: r.tile, result }
                })
                .collect()
        }

        fn pending(&self) -> usize {
            self.queued.len()
        }
    }

    fn slide() -> SlideDescriptor {
        let plane = ImagePlane::new(10_000, 8_000, 256, 5).unwrap().with_mpp(0.25, 0.25);
        let mut slide = SlideDescriptor::new(plane, "/api/wsi/1/tile");
        slide.name = Some("case-1".into());
        slide
    }

    fn session() -> SlideSession {
        SlideSession::open(
            slide(),
            &ViewerConfig::default(),
            ScreenSize::new(1000.0, 800.0),
            Box::new(InstantFetcher::default()),
        )
        .unwrap()
    }

    /// 200x200 image px square centred on (500, 500).
    fn square() -> Geometry {
        Geometry::polygon_from_coords(&[[400.0, 400.0], [600.0, 400.0], [600.0, 600.0], [400.0, 600.0]])
    }

    struct FailingRepository;

    impl AnnotationRepository for FailingRepository {
        fn load(&self, _slide: &str) -> Result<Vec<Annotation>, RepositoryError> {
            Err(RepositoryError::Transport("connection refused".into()))
        }

        fn save(&self, _slide: &str, _annotations: &[Annotation]) -> Result<(), RepositoryError> {
            Err(RepositoryError::Transport("connection refused".into()))
        }
    }

    #[test]
    fn test_open_fits_and_first_frame_draws() {
        let mut s = session();
        assert!(approx_eq(s.state().zoom, 0.1));
        let frame = s.pump();
        assert_eq!(frame.frame, 1);
        assert!(frame.update.needs_tile_redraw());
        assert!(frame.overlay.is_some());

        // Tiles requested when opening arrive with the first frame
        let tiles = frame.tiles.unwrap();
        assert_eq!(tiles.level, 2);
        assert_eq!(tiles.draws.len(), 20);
        assert!(tiles.is_complete());
        assert!(s.is_settled());
        assert!(s.pump().is_idle());
    }

    #[test]
    fn test_many_viewport_ops_one_redraw() {
        let mut s = session();
        s.pump();
        for _ in 0..10 {
            s.pan_by_screen(5.0, 0.0).unwrap();
        }
        s.zoom_steps(1, ScreenPoint::new(500.0, 400.0)).unwrap();
        let frame = s.pump();
        assert_eq!(frame.update.delivered, 11);
        assert_eq!(frame.update.viewport.map(|e| e.state), Some(s.state()));
        assert!(frame.tiles.is_some());
        assert!(frame.overlay.is_some());
    }

    #[test]
    fn test_rejected_viewport_op_publishes_nothing() {
        let mut s = session();
        s.pump();
        let before = s.state();
        assert!(s.zoom_to(f64::NAN, ScreenPoint::new(0.0, 0.0)).is_err());
        assert_eq!(s.state(), before);
        let frame = s.pump();
        assert!(frame.update.viewport.is_none());
    }

    #[test]
    fn test_square_projection_scenario() {
        let mut s = session();
        s.add_annotation(Annotation::new(1, square(), "Tumor"));
        // Center the square at zoom 1 in the middle of the container
        s.pan(Point::new(500.0 - s.state().center.x, 500.0 - s.state().center.y)).unwrap();
        s.zoom_to(1.0, ScreenPoint::new(500.0, 400.0)).unwrap();

        let overlay = s.pump().overlay.unwrap();
        let shape = overlay.shape(1).unwrap();
        match &shape.geometry {
            crate::overlay::ScreenGeometry::Polygon { rings } => {
                let first = rings[0][0];
                assert!(approx_eq(first.x, 400.0) && approx_eq(first.y, 300.0));
            }
            other => panic!("expected polygon, got {:?}", other),
        }
        assert_eq!(s.hit_test(ScreenPoint::new(500.0, 400.0)), Some(1));
        assert_eq!(s.hit_test(ScreenPoint::new(50.0, 50.0)), None);
    }

    #[test]
    fn test_select_and_delete_selected() {
        let mut s = session();
        s.add_annotation(Annotation::new(1, square(), "Tumor"));
        let center = s.viewport().image_to_screen(Point::new(500.0, 500.0));
        s.handle_pointer(PointerInput::Down(center));
        assert_eq!(s.store().selected(), Some(1));
        s.pump();

        assert!(s.delete_selected().is_some());
        assert_eq!(s.store().selected(), None);
        let overlay = s.pump().overlay.unwrap();
        assert!(overlay.shape(1).is_none());
    }

    #[test]
    fn test_rectangle_tool_creates_annotation() {
        let mut s = session();
        s.set_active_tool(AnnotationTool::Rectangle);
        s.handle_pointer(PointerInput::Down(ScreenPoint::new(100.0, 100.0)));
        s.handle_pointer(PointerInput::Move(ScreenPoint::new(150.0, 150.0)));
        let frame = s.pump();
        assert!(frame.overlay.unwrap().preview.is_some());

        s.handle_pointer(PointerInput::Up(ScreenPoint::new(200.0, 180.0)));
        assert_eq!(s.store().len(), 1);
        let ann = &s.store().annotations()[0];
        assert_eq!(ann.label, s.store().active_label());
        let Geometry::Rectangle(r) = ann.geometry else {
            panic!("expected rectangle");
        };
        // 100x80 screen px at zoom 0.1
        assert!(approx_eq(r.width, 1000.0) && approx_eq(r.height, 800.0));
        assert!(s.pump().overlay.unwrap().preview.is_none());
    }

    #[test]
    fn test_small_rectangle_kept_at_max_zoom() {
        let mut s = session();
        s.zoom_to(40.0, ScreenPoint::new(500.0, 400.0)).unwrap();
        s.set_active_tool(AnnotationTool::Rectangle);
        s.handle_pointer(PointerInput::Down(ScreenPoint::new(100.0, 100.0)));
        s.handle_pointer(PointerInput::Up(ScreenPoint::new(130.0, 130.0)));

        assert_eq!(s.store().len(), 1);
        let Geometry::Rectangle(r) = s.store().annotations()[0].geometry else {
            panic!("expected rectangle");
        };
        // 30 screen px at zoom 40
        assert!(approx_eq(r.width, 0.75) && approx_eq(r.height, 0.75));
    }

    #[test]
    fn test_polygon_closes_near_first_vertex() {
        let mut s = session();
        s.set_active_tool(AnnotationTool::Polygon);
        for (x, y) in [(100.0, 100.0), (300.0, 100.0), (300.0, 300.0)] {
            s.handle_pointer(PointerInput::Down(ScreenPoint::new(x, y)));
            s.handle_pointer(PointerInput::Up(ScreenPoint::new(x, y)));
        }
        assert!(s.drawing().is_drawing());
        s.handle_pointer(PointerInput::Down(ScreenPoint::new(103.0, 102.0)));
        assert!(!s.drawing().is_drawing());
        assert_eq!(s.store().len(), 1);
        assert_eq!(s.store().annotations()[0].geometry.kind(), "Polygon");
    }

    #[test]
    fn test_tool_switch_cancels_gesture() {
        let mut s = session();
        s.set_active_tool(AnnotationTool::Freehand);
        s.handle_pointer(PointerInput::Down(ScreenPoint::new(10.0, 10.0)));
        s.handle_pointer(PointerInput::Move(ScreenPoint::new(20.0, 10.0)));
        assert!(s.drawing().is_drawing());
        s.set_active_tool(AnnotationTool::Select);
        assert!(!s.drawing().is_drawing());
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_erase_skips_locked() {
        let mut s = session();
        s.add_annotation(Annotation::new(1, square(), "Tumor").locked(true));
        s.set_active_tool(AnnotationTool::Erase);
        let center = s.viewport().image_to_screen(Point::new(500.0, 500.0));
        s.handle_pointer(PointerInput::Down(center));
        assert_eq!(s.store().len(), 1);
    }

    #[test]
    fn test_listeners_see_store_changes() {
        let mut s = session();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        s.subscribe(Box::new(move |event| {
            if let SessionEvent::Store(e) = event {
                sink.borrow_mut().push(e.change.clone());
            }
        }));
        s.add_annotation(Annotation::new(4, Geometry::Point(Point::new(1.0, 1.0)), "A"));
        // No-op mutations publish nothing
        assert!(s.select(None).is_none());
        assert_eq!(s.update_annotation(4, AnnotationPatch::new()), UpdateOutcome::Unchanged);
        s.pump();
        assert_eq!(*seen.borrow(), vec![StoreChange::Added(4)]);
    }

    #[test]
    fn test_failed_load_yields_empty_store_and_notice() {
        let mut s = session();
        s.add_annotation(Annotation::new(1, square(), "Tumor"));
        assert_eq!(s.load_annotations(&FailingRepository), 0);
        assert!(s.store().is_empty());
        let notices = s.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(s.take_notices().is_empty());
    }

    #[test]
    fn test_failed_save_reports_error() {
        let mut s = session();
        assert!(s.save_annotations(&FailingRepository).is_err());
        assert_eq!(s.take_notices()[0].level, NoticeLevel::Error);
    }

    #[test]
    fn test_failed_tile_keeps_frame_alive() {
        let fetcher = InstantFetcher {
            fail: vec![TileDescriptor::new(2, 0, 0)],
            ..Default::default()
        };
        let mut s = SlideSession::open(slide(), &ViewerConfig::default(), ScreenSize::new(1000.0, 800.0), Box::new(fetcher))
            .unwrap();
        let tiles = s.pump().tiles.unwrap();
        assert_eq!(s.renderer_stats().failed, 1);
        assert!(!tiles.is_complete());
        assert_eq!(tiles.missing, vec![TileDescriptor::new(2, 0, 0)]);

        // Still visible: not retried until it leaves and re-enters the view
        s.pan_by_screen(1.0, 0.0).unwrap();
        s.pump();
        assert_eq!(s.renderer_stats().failed, 1);
        assert_eq!(s.renderer_stats().requested, 20);
    }

    #[test]
    fn test_export_uses_slide_key() {
        let mut s = session();
        s.add_annotation(Annotation::new(1, Geometry::Rectangle(Rect::new(0.0, 0.0, 4.0, 4.0)), "Tumor"));
        let bytes = s.export(&ExportRegistry::new(), "coco").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["images"][0]["file_name"], "case-1");
        assert!(matches!(
            s.export(&ExportRegistry::new(), "shapefile"),
            Err(ExportError::UnknownFormat(_))
        ));
    }
}
