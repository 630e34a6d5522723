//! Drag-to-select rectangle state for the displayed image.
//!
//! The selection is stored normalized to the displayed image (0.0..=1.0 on
//! both axes) so it stays attached to the image when the window is resized.
//! The caller converts pointer positions and deltas into normalized units;
//! ratio constraints additionally need the on-screen display size, because
//! normalized units are only square when the display is.

use eframe::egui::{Pos2, Rect, Vec2, pos2, vec2};

/// Screen-pixel radius within which a pointer grabs a handle.
pub const HANDLE_HIT_TOLERANCE: f32 = 10.0;

/// The parts of an existing selection a drag can grab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Drag {
    /// Drawing a new rectangle anchored at the press point.
    Draw { anchor: Pos2 },
    /// Adjusting the existing rectangle by one of its handles.
    Adjust(Handle),
}

/// Current selection plus in-flight drag state.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    rect: Option<Rect>,
    drag: Option<Drag>,
}

impl SelectionState {
    /// The selection in normalized image coordinates, if one exists.
    pub fn rect(&self) -> Option<Rect> {
        self.rect
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn clear(&mut self) {
        self.rect = None;
        self.drag = None;
    }

    /// Which handle of the on-screen selection rect `pos` grabs, if any.
    pub fn hit_test(pos: Pos2, screen_rect: Rect) -> Option<Handle> {
        let t = HANDLE_HIT_TOLERANCE;
        let corners = [
            (screen_rect.left_top(), Handle::TopLeft),
            (screen_rect.right_top(), Handle::TopRight),
            (screen_rect.left_bottom(), Handle::BottomLeft),
            (screen_rect.right_bottom(), Handle::BottomRight),
        ];
        for (corner, handle) in corners {
            if pos.distance(corner) < t {
                return Some(handle);
            }
        }

        let inside_v = pos.y > screen_rect.min.y && pos.y < screen_rect.max.y;
        let inside_h = pos.x > screen_rect.min.x && pos.x < screen_rect.max.x;
        if inside_v && (pos.x - screen_rect.min.x).abs() < t {
            return Some(Handle::Left);
        }
        if inside_v && (pos.x - screen_rect.max.x).abs() < t {
            return Some(Handle::Right);
        }
        if inside_h && (pos.y - screen_rect.min.y).abs() < t {
            return Some(Handle::Top);
        }
        if inside_h && (pos.y - screen_rect.max.y).abs() < t {
            return Some(Handle::Bottom);
        }

        screen_rect.contains(pos).then_some(Handle::Move)
    }

    /// Start a drag at `pos` (normalized). Grabbing a handle adjusts the
    /// existing selection; anywhere else starts drawing a new one.
    pub fn begin_drag(&mut self, pos: Pos2, handle: Option<Handle>) {
        match (handle, self.rect) {
            (Some(h), Some(_)) => self.drag = Some(Drag::Adjust(h)),
            _ => {
                let anchor = clamp_unit(pos);
                self.rect = Some(Rect::from_min_max(anchor, anchor));
                self.drag = Some(Drag::Draw { anchor });
            }
        }
    }

    /// Continue the active drag. `pos` is the current pointer position and
    /// `delta` the frame's pointer movement, both normalized; `ratio` is a
    /// pixel-space width/height constraint, or `None` for a free selection.
    pub fn drag_to(&mut self, pos: Pos2, delta: Vec2, display_size: Vec2, ratio: Option<f32>) {
        let (Some(drag), Some(rect)) = (self.drag, self.rect) else {
            return;
        };

        let updated = match drag {
            Drag::Draw { anchor } => draw_rect(anchor, clamp_unit(pos), display_size, ratio),
            Drag::Adjust(Handle::Move) => translate_clamped(rect, delta),
            Drag::Adjust(handle) => adjust_rect(rect, handle, delta, display_size, ratio),
        };
        self.rect = Some(sanitize(updated));
    }

    /// Finish the active drag. Returns true when a drag was actually in
    /// progress, i.e. the selection changed and the mapped crop rect should
    /// be recomputed.
    pub fn end_drag(&mut self) -> bool {
        self.drag.take().is_some()
    }

    /// Re-snap the current selection to `ratio`, preserving its center and
    /// its larger dimension where the bounds allow. Used when the selection
    /// lock is turned back on.
    pub fn snap_to_ratio(&mut self, ratio: f32, display_size: Vec2) {
        let Some(rect) = self.rect else {
            return;
        };
        let na = norm_aspect(ratio, display_size);

        let center = rect.center();
        let max_dim = rect.width().max(rect.height());
        let (mut w, mut h) = if na >= 1.0 {
            (max_dim, max_dim / na)
        } else {
            (max_dim * na, max_dim)
        };
        if w > 1.0 {
            w = 1.0;
            h = w / na;
        }
        if h > 1.0 {
            h = 1.0;
            w = h * na;
        }

        let snapped = Rect::from_center_size(center, vec2(w, h));
        self.rect = Some(sanitize(shift_into_unit(snapped)));
    }
}

/// Normalized-space width/height factor for a pixel-space ratio.
fn norm_aspect(ratio: f32, display_size: Vec2) -> f32 {
    ratio * display_size.y / display_size.x
}

fn clamp_unit(pos: Pos2) -> Pos2 {
    pos2(pos.x.clamp(0.0, 1.0), pos.y.clamp(0.0, 1.0))
}

/// Clamp to the unit square and restore min <= max after crossing drags.
fn sanitize(rect: Rect) -> Rect {
    Rect::from_two_pos(clamp_unit(rect.min), clamp_unit(rect.max))
}

/// Translate a rect so it lies fully within the unit square, preserving its
/// size. Assumes the rect is no larger than the unit square on either axis,
/// which holds for the ratio-snapped selection.
fn shift_into_unit(rect: Rect) -> Rect {
    let mut min = rect.min;
    if min.x < 0.0 {
        min.x = 0.0;
    } else if rect.max.x > 1.0 {
        min.x = 1.0 - rect.width();
    }
    if min.y < 0.0 {
        min.y = 0.0;
    } else if rect.max.y > 1.0 {
        min.y = 1.0 - rect.height();
    }
    Rect::from_min_size(min, rect.size())
}

/// Project raw screen dimensions onto the ratio direction `(ratio, 1)`,
/// yielding the closest screen-space size with exactly that ratio.
fn constrain_to_ratio(raw_w: f32, raw_h: f32, ratio: f32) -> (f32, f32) {
    let u = vec2(ratio, 1.0);
    let lambda = vec2(raw_w, raw_h).dot(u) / u.length_sq();
    (u.x * lambda, u.y * lambda)
}

/// Rect for an in-progress draw drag from `anchor` towards `pos`.
fn draw_rect(anchor: Pos2, pos: Pos2, display_size: Vec2, ratio: Option<f32>) -> Rect {
    let Some(ratio) = ratio else {
        return Rect::from_two_pos(anchor, pos);
    };

    let raw_w = (pos.x - anchor.x).abs() * display_size.x;
    let raw_h = (pos.y - anchor.y).abs() * display_size.y;
    let (w, h) = constrain_to_ratio(raw_w, raw_h, ratio);

    let mut w_norm = w / display_size.x;
    let mut h_norm = h / display_size.y;

    // Shrink to whatever fits between the anchor and the image edge in the
    // drag direction, keeping the ratio.
    let room_x = if pos.x >= anchor.x { 1.0 - anchor.x } else { anchor.x };
    let room_y = if pos.y >= anchor.y { 1.0 - anchor.y } else { anchor.y };
    let fit = (room_x / w_norm).min(room_y / h_norm).min(1.0);
    if fit.is_finite() {
        w_norm *= fit;
        h_norm *= fit;
    }

    let corner = pos2(
        if pos.x >= anchor.x {
            anchor.x + w_norm
        } else {
            anchor.x - w_norm
        },
        if pos.y >= anchor.y {
            anchor.y + h_norm
        } else {
            anchor.y - h_norm
        },
    );
    Rect::from_two_pos(anchor, corner)
}

/// Move the whole selection, stopping at the image edges.
fn translate_clamped(rect: Rect, delta: Vec2) -> Rect {
    let mut d = delta;
    if rect.min.x + d.x < 0.0 {
        d.x = -rect.min.x;
    }
    if rect.max.x + d.x > 1.0 {
        d.x = 1.0 - rect.max.x;
    }
    if rect.min.y + d.y < 0.0 {
        d.y = -rect.min.y;
    }
    if rect.max.y + d.y > 1.0 {
        d.y = 1.0 - rect.max.y;
    }
    rect.translate(d)
}

/// The fixed opposite corner and the dragged corner, for corner handles.
fn corner_anchor(rect: Rect, handle: Handle) -> Option<(Pos2, Pos2)> {
    match handle {
        Handle::TopLeft => Some((rect.max, rect.min)),
        Handle::TopRight => Some((rect.left_bottom(), rect.right_top())),
        Handle::BottomLeft => Some((rect.right_top(), rect.left_bottom())),
        Handle::BottomRight => Some((rect.min, rect.max)),
        _ => None,
    }
}

fn adjust_rect(
    rect: Rect,
    handle: Handle,
    delta: Vec2,
    display_size: Vec2,
    ratio: Option<f32>,
) -> Rect {
    let Some(ratio) = ratio else {
        return adjust_free(rect, handle, delta);
    };

    if let Some((anchor, corner)) = corner_anchor(rect, handle) {
        // Apply the delta to the dragged corner, then project the resulting
        // size onto the ratio and rebuild the rect from the fixed anchor.
        let corner = corner + delta;
        let raw_w = (corner.x - anchor.x).abs() * display_size.x;
        let raw_h = (corner.y - anchor.y).abs() * display_size.y;
        let (w, h) = constrain_to_ratio(raw_w, raw_h, ratio);
        let dim = vec2(w / display_size.x, h / display_size.y);

        return match handle {
            Handle::TopLeft => Rect::from_min_max(anchor - dim, anchor),
            Handle::TopRight => Rect::from_min_max(
                pos2(anchor.x, anchor.y - dim.y),
                pos2(anchor.x + dim.x, anchor.y),
            ),
            Handle::BottomLeft => Rect::from_min_max(
                pos2(anchor.x - dim.x, anchor.y),
                pos2(anchor.x, anchor.y + dim.y),
            ),
            _ => Rect::from_min_max(anchor, anchor + dim),
        };
    }

    // Side handles drive one dimension and center the other on the old
    // midline.
    let na = norm_aspect(ratio, display_size);
    let mut rect = rect;
    match handle {
        Handle::Left | Handle::Right => {
            match handle {
                Handle::Left => rect.min.x += delta.x,
                _ => rect.max.x += delta.x,
            }
            let h = rect.width() / na;
            let mid = rect.center().y;
            rect.min.y = mid - h * 0.5;
            rect.max.y = mid + h * 0.5;
        }
        Handle::Top | Handle::Bottom => {
            match handle {
                Handle::Top => rect.min.y += delta.y,
                _ => rect.max.y += delta.y,
            }
            let w = rect.height() * na;
            let mid = rect.center().x;
            rect.min.x = mid - w * 0.5;
            rect.max.x = mid + w * 0.5;
        }
        _ => {}
    }
    rect
}

fn adjust_free(mut rect: Rect, handle: Handle, delta: Vec2) -> Rect {
    match handle {
        Handle::TopLeft => rect.min += delta,
        Handle::TopRight => {
            rect.min.y += delta.y;
            rect.max.x += delta.x;
        }
        Handle::BottomLeft => {
            rect.min.x += delta.x;
            rect.max.y += delta.y;
        }
        Handle::BottomRight => rect.max += delta,
        Handle::Top => rect.min.y += delta.y,
        Handle::Bottom => rect.max.y += delta.y,
        Handle::Left => rect.min.x += delta.x,
        Handle::Right => rect.max.x += delta.x,
        Handle::Move => {}
    }
    rect
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: Vec2 = vec2(100.0, 100.0);

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn hit_test_finds_corners_edges_and_interior() {
        let rect = Rect::from_min_max(pos2(100.0, 100.0), pos2(300.0, 200.0));
        assert_eq!(
            SelectionState::hit_test(pos2(102.0, 101.0), rect),
            Some(Handle::TopLeft)
        );
        assert_eq!(
            SelectionState::hit_test(pos2(299.0, 199.0), rect),
            Some(Handle::BottomRight)
        );
        assert_eq!(
            SelectionState::hit_test(pos2(100.0, 150.0), rect),
            Some(Handle::Left)
        );
        assert_eq!(
            SelectionState::hit_test(pos2(200.0, 199.0), rect),
            Some(Handle::Bottom)
        );
        assert_eq!(
            SelectionState::hit_test(pos2(200.0, 150.0), rect),
            Some(Handle::Move)
        );
        assert_eq!(SelectionState::hit_test(pos2(50.0, 50.0), rect), None);
    }

    #[test]
    fn draw_drag_produces_the_dragged_rect() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.1, 0.2), None);
        sel.drag_to(pos2(0.5, 0.6), vec2(0.4, 0.4), SQUARE, None);
        assert!(sel.end_drag());

        let rect = sel.rect().unwrap();
        assert_close(rect.min.x, 0.1);
        assert_close(rect.min.y, 0.2);
        assert_close(rect.max.x, 0.5);
        assert_close(rect.max.y, 0.6);
    }

    #[test]
    fn crossing_drag_keeps_min_below_max() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.5, 0.5), None);
        sel.drag_to(pos2(0.2, 0.1), vec2(-0.3, -0.4), SQUARE, None);
        sel.end_drag();

        let rect = sel.rect().unwrap();
        assert!(rect.min.x <= rect.max.x);
        assert!(rect.min.y <= rect.max.y);
        assert_close(rect.min.x, 0.2);
        assert_close(rect.min.y, 0.1);
    }

    #[test]
    fn draw_drag_is_clamped_to_the_image() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.8, 0.8), None);
        sel.drag_to(pos2(1.5, 2.0), vec2(0.7, 1.2), SQUARE, None);
        sel.end_drag();

        let rect = sel.rect().unwrap();
        assert_close(rect.max.x, 1.0);
        assert_close(rect.max.y, 1.0);
    }

    #[test]
    fn ratio_locked_draw_projects_onto_the_ratio() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.0, 0.0), None);
        // Square display, square ratio: 0.8 x 0.4 projects to 0.6 x 0.6.
        sel.drag_to(pos2(0.8, 0.4), vec2(0.8, 0.4), SQUARE, Some(1.0));
        sel.end_drag();

        let rect = sel.rect().unwrap();
        assert_close(rect.width(), 0.6);
        assert_close(rect.height(), 0.6);
    }

    #[test]
    fn ratio_locked_draw_respects_image_bounds() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.7, 0.7), None);
        sel.drag_to(pos2(1.0, 1.0), vec2(0.3, 0.3), SQUARE, Some(1.0));
        sel.end_drag();

        let rect = sel.rect().unwrap();
        assert!(rect.max.x <= 1.0 + 1e-4);
        assert!(rect.max.y <= 1.0 + 1e-4);
        assert_close(rect.width(), rect.height());
    }

    #[test]
    fn move_drag_stops_at_the_edges() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.1, 0.1), None);
        sel.drag_to(pos2(0.4, 0.4), vec2(0.3, 0.3), SQUARE, None);
        sel.end_drag();

        sel.begin_drag(pos2(0.2, 0.2), Some(Handle::Move));
        sel.drag_to(pos2(0.9, 0.2), vec2(0.7, 0.0), SQUARE, None);
        sel.end_drag();

        let rect = sel.rect().unwrap();
        assert_close(rect.max.x, 1.0);
        assert_close(rect.min.x, 0.7);
        // Vertical position is untouched.
        assert_close(rect.min.y, 0.1);
    }

    #[test]
    fn corner_adjust_with_ratio_keeps_the_ratio() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.2, 0.2), None);
        sel.drag_to(pos2(0.6, 0.6), vec2(0.4, 0.4), SQUARE, None);
        sel.end_drag();

        sel.begin_drag(pos2(0.6, 0.6), Some(Handle::BottomRight));
        sel.drag_to(pos2(0.9, 0.7), vec2(0.3, 0.1), SQUARE, Some(1.0));
        sel.end_drag();

        let rect = sel.rect().unwrap();
        assert_close(rect.width(), rect.height());
        // Anchor stays put.
        assert_close(rect.min.x, 0.2);
        assert_close(rect.min.y, 0.2);
    }

    #[test]
    fn side_adjust_with_ratio_centers_the_other_dimension() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.3, 0.4), None);
        sel.drag_to(pos2(0.5, 0.6), vec2(0.2, 0.2), SQUARE, None);
        sel.end_drag();
        let before = sel.rect().unwrap();

        sel.begin_drag(pos2(0.5, 0.5), Some(Handle::Right));
        sel.drag_to(pos2(0.7, 0.5), vec2(0.2, 0.0), SQUARE, Some(1.0));
        sel.end_drag();

        let after = sel.rect().unwrap();
        assert_close(after.width(), 0.4);
        assert_close(after.height(), 0.4);
        assert_close(after.center().y, before.center().y);
    }

    #[test]
    fn snap_to_ratio_preserves_center_and_major_dimension() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.2, 0.3), None);
        sel.drag_to(pos2(0.8, 0.5), vec2(0.6, 0.2), SQUARE, None);
        sel.end_drag();
        let before = sel.rect().unwrap();

        sel.snap_to_ratio(1.0, SQUARE);
        let after = sel.rect().unwrap();
        assert_close(after.width(), 0.6);
        assert_close(after.height(), 0.6);
        assert_close(after.center().x, before.center().x);
    }

    #[test]
    fn snap_to_ratio_fits_within_the_image() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.0, 0.4), None);
        sel.drag_to(pos2(1.0, 0.6), vec2(1.0, 0.2), SQUARE, None);
        sel.end_drag();

        sel.snap_to_ratio(1.0, SQUARE);
        let rect = sel.rect().unwrap();
        assert!(rect.min.x >= -1e-4 && rect.max.x <= 1.0 + 1e-4);
        assert!(rect.min.y >= -1e-4 && rect.max.y <= 1.0 + 1e-4);
        assert_close(rect.width(), rect.height());
    }

    #[test]
    fn end_drag_reports_whether_a_drag_was_active() {
        let mut sel = SelectionState::default();
        assert!(!sel.end_drag());
        sel.begin_drag(pos2(0.1, 0.1), None);
        assert!(sel.end_drag());
        assert!(!sel.end_drag());
    }

    #[test]
    fn clear_discards_selection_and_drag() {
        let mut sel = SelectionState::default();
        sel.begin_drag(pos2(0.1, 0.1), None);
        sel.clear();
        assert!(sel.rect().is_none());
        assert!(!sel.is_dragging());
    }
}
