// ============================================================================
// VIEWPORT STATE — immutable canvas state driven by commands
// ============================================================================
//
// A `ViewportState` is a value.  `execute` returns the next state and leaves
// the current one untouched, so a host can keep the previous state around,
// compare them, or drop a failed transition without cleanup.  Bitmaps are
// `Arc`-shared between states; only painting copies the mask.

use std::sync::Arc;

use egui::{Pos2, Vec2, vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CanvasConfig;
use crate::error::{CanvasError, CanvasResult};
use crate::geometry::{
    ViewportRect, expand_to_aspect, fit_to_container, is_finite_point, parse_aspect_ratio,
};
use crate::handles::{DragController, Handle, handle_layout, hit_test};
use crate::mask::{BrushSettings, MaskLayer};
use crate::ops::export::{self, ExportPayload, ViewportFrame, viewport_pixel_size};
use crate::source::{EncodedImage, ImageMime, SourceImage};

/// Active editing tool.  Decides where pointer events go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    #[default]
    None,
    /// Pointer paints into the mask.
    Paint,
    /// Pointer drags the expansion rectangle's handles ("uncrop").
    Expand,
    /// Same handle controller as `Expand`; the host decides what to submit.
    Resize,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::None => "none",
            Tool::Paint => "paint",
            Tool::Expand => "expand",
            Tool::Resize => "resize",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Some(Tool::None),
            "paint" | "brush" | "mask" => Some(Tool::Paint),
            "expand" | "uncrop" => Some(Tool::Expand),
            "resize" => Some(Tool::Resize),
            _ => None,
        }
    }

    pub fn uses_handles(&self) -> bool {
        matches!(self, Tool::Expand | Tool::Resize)
    }
}

/// State transitions understood by [`ViewportState::execute`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Start a new editing session: source, original snapshot, both rects
    /// and the mask are all replaced.
    LoadImage(EncodedImage),
    /// Result re-entry from the generation service.  Like `LoadImage` but the
    /// original snapshot is kept.
    ReplaceSource(EncodedImage),
    RevertToOriginal,
    ResizeContainer { width: f32, height: f32 },
    SetTool(Tool),
    SetBrush(BrushSettings),
    PointerDown(Pos2),
    PointerMove(Pos2),
    PointerUp,
    /// One complete drag of `handle` to `to`: press, move and release.
    DragHandle { handle: Handle, to: Pos2 },
    SetAspectRatio(String),
    SetExplicitSize { width: f32, height: f32 },
    /// One interpolated mask segment, independent of pointer state.
    PaintStroke { from: Pos2, to: Pos2 },
    ClearMask,
    Reset,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::LoadImage(_) => "load_image",
            Command::ReplaceSource(_) => "replace_source",
            Command::RevertToOriginal => "revert_to_original",
            Command::ResizeContainer { .. } => "resize_container",
            Command::SetTool(_) => "set_tool",
            Command::SetBrush(_) => "set_brush",
            Command::PointerDown(_) => "pointer_down",
            Command::PointerMove(_) => "pointer_move",
            Command::PointerUp => "pointer_up",
            Command::DragHandle { .. } => "drag_handle",
            Command::SetAspectRatio(_) => "set_aspect_ratio",
            Command::SetExplicitSize { .. } => "set_explicit_size",
            Command::PaintStroke { .. } => "paint_stroke",
            Command::ClearMask => "clear_mask",
            Command::Reset => "reset",
        }
    }

    /// Display-space positions carried by the command.
    fn points(&self) -> Vec<Pos2> {
        match self {
            Command::PointerDown(p) | Command::PointerMove(p) => vec![*p],
            Command::DragHandle { to, .. } => vec![*to],
            Command::PaintStroke { from, to } => vec![*from, *to],
            _ => Vec::new(),
        }
    }
}

/// Read-only questions answered by [`ViewportState::query`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    ImageDrawRect,
    CanvasRect,
    Handles,
    HitTest { x: i32, y: i32 },
    MaskIsEmpty,
    Session,
    /// Viewport-sized RGBA frame (image + mask overlay).
    Render,
    /// Native-resolution image with the mask composited on.
    CompositeWithMask,
    /// Canvas-sized PNG with transparent expansion area.
    ExpandedImage,
    /// The untouched source payload, for "download".
    SourcePayload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum QueryResult {
    Rect(ViewportRect),
    Handles(Vec<(Handle, Pos2)>),
    Hit(Option<Handle>),
    Flag(bool),
    Session(SessionInfo),
    Frame(ViewportFrame),
    Payload(ExportPayload),
}

/// Summary of the current session for host status bars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session: Uuid,
    pub loaded: bool,
    pub natural_width: u32,
    pub natural_height: u32,
    pub mime: Option<ImageMime>,
    pub container: Vec2,
    pub tool: Tool,
    pub brush: BrushSettings,
    /// True when the current source differs from the original snapshot.
    pub edited: bool,
}

/// Immutable canvas state: source, both rectangles, mask and tool state.
#[derive(Clone, Debug)]
pub struct ViewportState {
    session: Uuid,
    config: Arc<CanvasConfig>,
    container: Vec2,
    source: Option<SourceImage>,
    original: Option<SourceImage>,
    image_draw_rect: ViewportRect,
    canvas_rect: ViewportRect,
    mask: MaskLayer,
    tool: Tool,
    brush: BrushSettings,
    drag: DragController,
    /// Last pointer position of the stroke in progress.
    stroke_anchor: Option<Pos2>,
}

impl ViewportState {
    pub fn new(config: CanvasConfig, container: Vec2) -> Self {
        let (w, h) = viewport_pixel_size(container);
        let brush = config.default_brush.sanitized();
        Self {
            session: Uuid::nil(),
            config: Arc::new(config),
            container,
            source: None,
            original: None,
            image_draw_rect: ViewportRect::default(),
            canvas_rect: ViewportRect::default(),
            mask: MaskLayer::new(w, h),
            tool: Tool::None,
            brush,
            drag: DragController::default(),
            stroke_anchor: None,
        }
    }

    // ---- accessors --------------------------------------------------------

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn container(&self) -> Vec2 {
        self.container
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn original(&self) -> Option<&SourceImage> {
        self.original.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    pub fn image_draw_rect(&self) -> ViewportRect {
        self.image_draw_rect
    }

    pub fn canvas_rect(&self) -> ViewportRect {
        self.canvas_rect
    }

    pub fn mask(&self) -> &MaskLayer {
        &self.mask
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn brush(&self) -> BrushSettings {
        self.brush
    }

    pub fn active_handle(&self) -> Option<Handle> {
        self.drag.active()
    }

    fn require_source(&self) -> CanvasResult<&SourceImage> {
        self.source.as_ref().ok_or(CanvasError::NotLoaded)
    }

    // ---- transitions ------------------------------------------------------

    /// Apply `cmd` and return the resulting state.  On error `self` is the
    /// state to keep.
    pub fn execute(&self, cmd: &Command) -> CanvasResult<ViewportState> {
        let mut next = self.clone();
        next.apply(cmd)?;
        Ok(next)
    }

    /// Install an already-decoded image as a new session.  Used by hosts that
    /// decode on a worker thread.
    pub fn with_loaded(&self, image: SourceImage) -> ViewportState {
        let mut next = self.clone();
        next.original = Some(image.clone());
        next.install_source(image);
        next
    }

    /// Install an already-decoded image as a result re-entry.
    pub fn with_replaced(&self, image: SourceImage) -> ViewportState {
        let mut next = self.clone();
        if next.original.is_none() {
            next.original = Some(image.clone());
        }
        next.install_source(image);
        next
    }

    fn apply(&mut self, cmd: &Command) -> CanvasResult<()> {
        for p in cmd.points() {
            if !is_finite_point(p) {
                return Err(CanvasError::NonFinitePoint { x: p.x, y: p.y });
            }
        }
        match cmd {
            Command::LoadImage(encoded) => {
                let image = SourceImage::decode(encoded.clone())?;
                self.original = Some(image.clone());
                self.install_source(image);
            }
            Command::ReplaceSource(encoded) => {
                let image = SourceImage::decode(encoded.clone())?;
                if self.original.is_none() {
                    self.original = Some(image.clone());
                }
                self.install_source(image);
            }
            Command::RevertToOriginal => {
                let original = self.original.clone().ok_or(CanvasError::NotLoaded)?;
                crate::log_info!("revert to original");
                self.install_source(original);
            }
            Command::ResizeContainer { width, height } => {
                self.container = vec2((*width).max(0.0), (*height).max(0.0));
                // Old mask coordinates no longer line up with the new fit.
                let (w, h) = viewport_pixel_size(self.container);
                self.mask = MaskLayer::new(w, h);
                self.end_gestures();
                self.refit();
            }
            Command::SetTool(tool) => {
                if self.tool == Tool::Paint && *tool != Tool::Paint {
                    self.mask.clear();
                }
                self.tool = *tool;
                self.end_gestures();
            }
            Command::SetBrush(brush) => {
                self.brush = brush.sanitized();
            }
            Command::PointerDown(p) => self.pointer_down(*p),
            Command::PointerMove(p) => self.pointer_move(*p),
            Command::PointerUp => self.end_gestures(),
            Command::DragHandle { handle, to } => {
                if self.tool.uses_handles() && self.is_loaded() {
                    // One-shot drag; a pointer gesture in progress keeps its own grab.
                    let mut drag = DragController::default();
                    drag.grab(*handle);
                    if let Some(rect) = drag.drag(&self.canvas_rect, *to, self.min_extent()) {
                        self.canvas_rect = rect;
                    }
                }
            }
            Command::SetAspectRatio(ratio) => {
                let target = parse_aspect_ratio(ratio)?;
                self.require_source()?;
                let expanded = expand_to_aspect(&self.image_draw_rect, target);
                self.canvas_rect = self.at_least_min(expanded);
            }
            Command::SetExplicitSize { width, height } => {
                self.require_source()?;
                let min = self.min_extent();
                if !(width.is_finite() && height.is_finite()) || *width < min || *height < min {
                    return Err(CanvasError::DegenerateGeometry {
                        width: *width,
                        height: *height,
                        min,
                    });
                }
                let center = (self.container / 2.0).to_pos2();
                self.canvas_rect = ViewportRect::from_center_size(center, *width, *height);
            }
            Command::PaintStroke { from, to } => {
                if self.tool == Tool::Paint {
                    self.mask.stroke_segment(*from, *to, &self.brush);
                }
            }
            Command::ClearMask => self.mask.clear(),
            Command::Reset => {
                self.mask.clear();
                self.end_gestures();
                self.refit();
            }
        }
        Ok(())
    }

    fn pointer_down(&mut self, p: Pos2) {
        match self.tool {
            Tool::Paint => {
                self.mask.draw_soft_circle(p, &self.brush);
                self.stroke_anchor = Some(p);
            }
            Tool::Expand | Tool::Resize => {
                if self.is_loaded() {
                    self.drag.press(&self.canvas_rect, p, self.config.handle_size);
                }
            }
            Tool::None => {}
        }
    }

    fn pointer_move(&mut self, p: Pos2) {
        match self.tool {
            Tool::Paint => {
                if let Some(anchor) = self.stroke_anchor {
                    self.mask.stroke_segment(anchor, p, &self.brush);
                    self.stroke_anchor = Some(p);
                }
            }
            Tool::Expand | Tool::Resize => {
                if let Some(rect) = self.drag.drag(&self.canvas_rect, p, self.min_extent()) {
                    self.canvas_rect = rect;
                }
            }
            Tool::None => {}
        }
    }

    fn end_gestures(&mut self) {
        self.drag.release();
        self.stroke_anchor = None;
    }

    /// New source with fresh geometry, mask and session id.
    fn install_source(&mut self, image: SourceImage) {
        self.session = Uuid::new_v4();
        crate::log_info!(
            "session {}: {}×{} {}",
            self.session,
            image.natural_width(),
            image.natural_height(),
            image.mime().as_str()
        );
        self.source = Some(image);
        let (w, h) = viewport_pixel_size(self.container);
        self.mask = MaskLayer::new(w, h);
        self.end_gestures();
        self.refit();
    }

    /// Re-fit the image to the container and reset the expansion rectangle.
    fn refit(&mut self) {
        let Some(src) = &self.source else {
            self.image_draw_rect = ViewportRect::default();
            self.canvas_rect = ViewportRect::default();
            return;
        };
        self.image_draw_rect =
            fit_to_container(src.natural_width(), src.natural_height(), self.container);
        self.canvas_rect = self.at_least_min(self.image_draw_rect);
    }

    fn min_extent(&self) -> f32 {
        self.config.min_canvas_extent()
    }

    /// Grow `rect` around its center until both sides reach the minimum.
    fn at_least_min(&self, rect: ViewportRect) -> ViewportRect {
        let min = self.min_extent();
        if rect.width >= min && rect.height >= min {
            return rect;
        }
        ViewportRect::from_center_size(rect.center(), rect.width.max(min), rect.height.max(min))
    }

    // ---- queries ----------------------------------------------------------

    pub fn query(&self, q: &Query) -> CanvasResult<QueryResult> {
        Ok(match q {
            Query::ImageDrawRect => QueryResult::Rect(self.image_draw_rect),
            Query::CanvasRect => QueryResult::Rect(self.canvas_rect),
            Query::Handles => QueryResult::Handles(handle_layout(&self.canvas_rect)),
            Query::HitTest { x, y } => QueryResult::Hit(self.hit_test(Pos2::new(*x as f32, *y as f32))),
            Query::MaskIsEmpty => QueryResult::Flag(self.mask.is_empty()),
            Query::Session => QueryResult::Session(self.session_info()),
            Query::Render => QueryResult::Frame(ViewportFrame::from_image(self.render())),
            Query::CompositeWithMask => QueryResult::Payload(self.composite_image_with_mask()?),
            Query::ExpandedImage => QueryResult::Payload(self.final_expanded_image()?),
            Query::SourcePayload => QueryResult::Payload(self.source_payload()?),
        })
    }

    pub fn hit_test(&self, pointer: Pos2) -> Option<Handle> {
        if !self.is_loaded() {
            return None;
        }
        hit_test(&self.canvas_rect, pointer, self.config.handle_size)
    }

    pub fn session_info(&self) -> SessionInfo {
        let (natural_width, natural_height) = self
            .source
            .as_ref()
            .map(|s| (s.natural_width(), s.natural_height()))
            .unwrap_or((0, 0));
        let edited = match (&self.source, &self.original) {
            (Some(s), Some(o)) => s.encoded() != o.encoded(),
            _ => false,
        };
        SessionInfo {
            session: self.session,
            loaded: self.is_loaded(),
            natural_width,
            natural_height,
            mime: self.source.as_ref().map(|s| s.mime()),
            container: self.container,
            tool: self.tool,
            brush: self.brush,
            edited,
        }
    }

    /// Viewport frame: image at its fitted rect, mask on top.
    pub fn render(&self) -> image::RgbaImage {
        export::render_viewport(
            self.source.as_ref(),
            &self.image_draw_rect,
            &self.mask,
            self.container,
            &self.config,
        )
    }

    pub fn composite_image_with_mask(&self) -> CanvasResult<ExportPayload> {
        let src = self.require_source()?;
        export::export_composite(src, &self.image_draw_rect, &self.mask, &self.config)
    }

    pub fn final_expanded_image(&self) -> CanvasResult<ExportPayload> {
        let src = self.require_source()?;
        export::export_expanded(src, &self.image_draw_rect, &self.canvas_rect)
    }

    pub fn source_payload(&self) -> CanvasResult<ExportPayload> {
        let src = self.require_source()?;
        Ok(ExportPayload {
            image: src.encoded().clone(),
            width: src.natural_width(),
            height: src.natural_height(),
        })
    }
}
