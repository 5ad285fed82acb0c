use serde::{Deserialize, Serialize};
use std::fmt;

/// Screen placement of the overlay.
///
/// Variants are declared in cycle order: clockwise around the screen starting
/// at the bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    BottomRight,
    #[serde(alias = "bottom-middle")]
    BottomCenter,
    BottomLeft,
    #[serde(alias = "left-middle")]
    MiddleLeft,
    TopLeft,
    #[serde(alias = "top-middle")]
    TopCenter,
    TopRight,
    #[serde(alias = "right-middle")]
    MiddleRight,
}

impl Position {
    pub const CYCLE: [Position; 8] = [
        Position::BottomRight,
        Position::BottomCenter,
        Position::BottomLeft,
        Position::MiddleLeft,
        Position::TopLeft,
        Position::TopCenter,
        Position::TopRight,
        Position::MiddleRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next placement in the fixed cycle, wrapping after `MiddleRight`
    pub fn next(self) -> Position {
        Self::CYCLE[(self.index() + 1) % Self::CYCLE.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            Position::BottomRight => "bottom-right",
            Position::BottomCenter => "bottom-center",
            Position::BottomLeft => "bottom-left",
            Position::MiddleLeft => "middle-left",
            Position::TopLeft => "top-left",
            Position::TopCenter => "top-center",
            Position::TopRight => "top-right",
            Position::MiddleRight => "middle-right",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u16,
    pub height: u16,
}

impl Dimensions {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Top-left corner of a window in root coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}
