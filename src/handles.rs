// ============================================================================
// DRAG HANDLES — eight resize handles on the expansion rectangle
// ============================================================================

use egui::{Pos2, pos2};
use serde::{Deserialize, Serialize};

use crate::geometry::ViewportRect;

/// One of the eight resize handles on the expansion rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handle {
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Handle {
    /// Corners first so that a pointer near a corner never grabs an edge.
    pub fn all() -> &'static [Handle] {
        &[
            Handle::TopLeft,
            Handle::TopRight,
            Handle::BottomLeft,
            Handle::BottomRight,
            Handle::Top,
            Handle::Bottom,
            Handle::Left,
            Handle::Right,
        ]
    }

    /// Short code: `t`, `b`, `l`, `r`, `tl`, `tr`, `bl`, `br`.
    pub fn code(&self) -> &'static str {
        match self {
            Handle::Top => "t",
            Handle::Bottom => "b",
            Handle::Left => "l",
            Handle::Right => "r",
            Handle::TopLeft => "tl",
            Handle::TopRight => "tr",
            Handle::BottomLeft => "bl",
            Handle::BottomRight => "br",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        Some(match s.trim().to_lowercase().as_str() {
            "t" | "top" | "n" => Handle::Top,
            "b" | "bottom" | "s" => Handle::Bottom,
            "l" | "left" | "w" => Handle::Left,
            "r" | "right" | "e" => Handle::Right,
            "tl" | "top-left" | "nw" => Handle::TopLeft,
            "tr" | "top-right" | "ne" => Handle::TopRight,
            "bl" | "bottom-left" | "sw" => Handle::BottomLeft,
            "br" | "bottom-right" | "se" => Handle::BottomRight,
            _ => return None,
        })
    }

    pub fn moves_top(&self) -> bool {
        matches!(self, Handle::Top | Handle::TopLeft | Handle::TopRight)
    }

    pub fn moves_bottom(&self) -> bool {
        matches!(self, Handle::Bottom | Handle::BottomLeft | Handle::BottomRight)
    }

    pub fn moves_left(&self) -> bool {
        matches!(self, Handle::Left | Handle::TopLeft | Handle::BottomLeft)
    }

    pub fn moves_right(&self) -> bool {
        matches!(self, Handle::Right | Handle::TopRight | Handle::BottomRight)
    }

    /// Where this handle sits on `rect`: edge midpoints and corners.
    pub fn position(&self, rect: &ViewportRect) -> Pos2 {
        let x = if self.moves_left() {
            rect.x
        } else if self.moves_right() {
            rect.right()
        } else {
            rect.x + rect.width / 2.0
        };
        let y = if self.moves_top() {
            rect.y
        } else if self.moves_bottom() {
            rect.bottom()
        } else {
            rect.y + rect.height / 2.0
        };
        pos2(x, y)
    }
}

/// All handles with their positions on `rect`, for drawing.
pub fn handle_layout(rect: &ViewportRect) -> Vec<(Handle, Pos2)> {
    Handle::all().iter().map(|h| (*h, h.position(rect))).collect()
}

/// Handle whose `handle_size`-wide square (centered on the handle) contains
/// `pointer`, if any.
pub fn hit_test(rect: &ViewportRect, pointer: Pos2, handle_size: f32) -> Option<Handle> {
    let half = handle_size / 2.0;
    Handle::all().iter().copied().find(|h| {
        let p = h.position(rect);
        (pointer.x - p.x).abs() <= half && (pointer.y - p.y).abs() <= half
    })
}

/// Apply one pointer-move of `handle` to `rect`.
///
/// Right/bottom set the far edge to the pointer; left/top move the near edge
/// to the pointer and grow by the delta.  Corner handles combine both axis
/// rules.  Afterwards each axis is clamped to `min_extent`; the drag is never
/// rejected.
pub fn resize_with_handle(
    rect: &ViewportRect,
    handle: Handle,
    pointer: Pos2,
    min_extent: f32,
) -> ViewportRect {
    let mut r = *rect;

    if handle.moves_right() {
        r.width = pointer.x - r.x;
    }
    if handle.moves_left() {
        r.width += r.x - pointer.x;
        r.x = pointer.x;
    }
    if handle.moves_bottom() {
        r.height = pointer.y - r.y;
    }
    if handle.moves_top() {
        r.height += r.y - pointer.y;
        r.y = pointer.y;
    }

    r.width = r.width.max(min_extent);
    r.height = r.height.max(min_extent);
    r
}

/// Live drag state: which handle is held, if any.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DragController {
    active: Option<Handle>,
}

impl DragController {
    pub fn active(&self) -> Option<Handle> {
        self.active
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// Pointer pressed: grab the handle under it.  Returns the grabbed handle.
    pub fn press(&mut self, rect: &ViewportRect, pointer: Pos2, handle_size: f32) -> Option<Handle> {
        self.active = hit_test(rect, pointer, handle_size);
        self.active
    }

    pub fn grab(&mut self, handle: Handle) {
        self.active = Some(handle);
    }

    /// Pointer moved: resize `rect` if a handle is held, otherwise `None`.
    pub fn drag(&self, rect: &ViewportRect, pointer: Pos2, min_extent: f32) -> Option<ViewportRect> {
        self.active
            .map(|h| resize_with_handle(rect, h, pointer, min_extent))
    }

    pub fn release(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: f32 = 24.0;

    fn square() -> ViewportRect {
        ViewportRect::new(0.0, 0.0, 100.0, 100.0)
    }

    #[test]
    fn bottom_right_drag_and_clamp() {
        let r = resize_with_handle(&square(), Handle::BottomRight, pos2(60.0, 60.0), MIN);
        assert_eq!(r, ViewportRect::new(0.0, 0.0, 60.0, 60.0));
        let r = resize_with_handle(&r, Handle::BottomRight, pos2(10.0, 10.0), MIN);
        assert_eq!(r, ViewportRect::new(0.0, 0.0, 24.0, 24.0));
    }

    #[test]
    fn left_and_top_move_origin() {
        let r = resize_with_handle(&square(), Handle::Left, pos2(-20.0, 999.0), MIN);
        assert_eq!(r, ViewportRect::new(-20.0, 0.0, 120.0, 100.0));
        let r = resize_with_handle(&square(), Handle::Top, pos2(999.0, 30.0), MIN);
        assert_eq!(r, ViewportRect::new(0.0, 30.0, 100.0, 70.0));
    }

    #[test]
    fn corner_combines_axes() {
        let r = resize_with_handle(&square(), Handle::TopLeft, pos2(10.0, -10.0), MIN);
        assert_eq!(r, ViewportRect::new(10.0, -10.0, 90.0, 110.0));
        let r = resize_with_handle(&square(), Handle::BottomLeft, pos2(-5.0, 50.0), MIN);
        assert_eq!(r, ViewportRect::new(-5.0, 0.0, 105.0, 50.0));
    }

    #[test]
    fn edge_handles_leave_other_axis_alone() {
        let r = resize_with_handle(&square(), Handle::Right, pos2(150.0, -400.0), MIN);
        assert_eq!(r, ViewportRect::new(0.0, 0.0, 150.0, 100.0));
        let r = resize_with_handle(&square(), Handle::Bottom, pos2(-400.0, 130.0), MIN);
        assert_eq!(r, ViewportRect::new(0.0, 0.0, 100.0, 130.0));
    }

    #[test]
    fn minimum_holds_for_any_drag_sequence() {
        let pointers = [
            pos2(-300.0, 500.0),
            pos2(0.0, 0.0),
            pos2(1000.0, -1000.0),
            pos2(50.0, 50.0),
            pos2(99.0, 1.0),
        ];
        let mut r = square();
        for (i, p) in pointers.iter().cycle().take(200).enumerate() {
            let h = Handle::all()[i % 8];
            r = resize_with_handle(&r, h, *p, MIN);
            assert!(r.width >= MIN && r.height >= MIN, "{:?} after {:?}", r, h);
        }
    }

    #[test]
    fn handle_positions() {
        let r = ViewportRect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(Handle::TopLeft.position(&r), pos2(10.0, 20.0));
        assert_eq!(Handle::Top.position(&r), pos2(60.0, 20.0));
        assert_eq!(Handle::Right.position(&r), pos2(110.0, 45.0));
        assert_eq!(Handle::BottomRight.position(&r), pos2(110.0, 70.0));
        assert_eq!(handle_layout(&r).len(), 8);
    }

    #[test]
    fn hit_test_prefers_corners() {
        // A tiny rect puts the top midpoint within reach of the corner.
        let r = ViewportRect::new(0.0, 0.0, 10.0, 40.0);
        assert_eq!(hit_test(&r, pos2(1.0, 1.0), 12.0), Some(Handle::TopLeft));
        assert_eq!(hit_test(&r, pos2(0.0, 20.0), 12.0), Some(Handle::Left));
        assert_eq!(hit_test(&r, pos2(5.0, 20.0), 4.0), None);
    }

    #[test]
    fn codes_round_trip() {
        for h in Handle::all() {
            assert_eq!(Handle::from_code(h.code()), Some(*h));
        }
        assert_eq!(Handle::from_code("SE"), Some(Handle::BottomRight));
        assert_eq!(Handle::from_code("middle"), None);
    }

    #[test]
    fn controller_lifecycle() {
        let mut c = DragController::default();
        let r = square();
        assert_eq!(c.drag(&r, pos2(50.0, 50.0), MIN), None);
        assert_eq!(c.press(&r, pos2(101.0, 99.0), 12.0), Some(Handle::BottomRight));
        assert_eq!(c.drag(&r, pos2(60.0, 60.0), MIN), Some(ViewportRect::new(0.0, 0.0, 60.0, 60.0)));
        c.release();
        assert!(!c.is_dragging());
    }
}
