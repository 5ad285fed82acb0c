//! Screen placement for the overlay and its input dialog

use crate::constants::positioning::{DIALOG_GAP, DIALOG_HEIGHT, EDGE_PADDING};
use crate::types::{Dimensions, Point, Position};

/// Top-left corner of the overlay for `position`, keeping `EDGE_PADDING` from the edges
pub fn overlay_origin(position: Position, screen: Dimensions, overlay: Dimensions) -> Point {
    let (sw, sh) = (i32::from(screen.width), i32::from(screen.height));
    let (w, h) = (i32::from(overlay.width), i32::from(overlay.height));

    let left = EDGE_PADDING;
    let center_x = (sw - w) / 2;
    let right = sw - w - EDGE_PADDING;
    let top = EDGE_PADDING;
    let middle_y = (sh - h) / 2;
    let bottom = sh - h - EDGE_PADDING;

    let (x, y) = match position {
        Position::TopLeft => (left, top),
        Position::TopCenter => (center_x, top),
        Position::TopRight => (right, top),
        Position::MiddleLeft => (left, middle_y),
        Position::MiddleRight => (right, middle_y),
        Position::BottomLeft => (left, bottom),
        Position::BottomCenter => (center_x, bottom),
        Position::BottomRight => (right, bottom),
    };
    // Overlays larger than the screen pin to the top-left corner
    Point::new(x.max(0), y.max(0))
}

fn in_bottom_row(position: Position) -> bool {
    matches!(
        position,
        Position::BottomLeft | Position::BottomCenter | Position::BottomRight
    )
}

/// Dialog sits above the overlay in the bottom row and below it elsewhere,
/// matching the overlay's width
pub fn dialog_geometry(position: Position, screen: Dimensions, overlay: Dimensions) -> (Point, Dimensions) {
    let origin = overlay_origin(position, screen, overlay);
    let height = i32::from(DIALOG_HEIGHT);
    let y = if in_bottom_row(position) {
        origin.y - DIALOG_GAP - height
    } else {
        origin.y + i32::from(overlay.height) + DIALOG_GAP
    };
    (
        Point::new(origin.x, y.max(0)),
        Dimensions::new(overlay.width, DIALOG_HEIGHT),
    )
}
