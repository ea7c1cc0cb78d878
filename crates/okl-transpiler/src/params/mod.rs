//! Validated parameter structs produced by the frontend parsers.

use serde::Serialize;

/// Parallel dimension an `@outer`/`@inner` loop binds to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    Auto,
    X,
    Y,
    Z,
}

impl Axis {
    /// Resolved axes in assignment order.
    pub const RESOLVED: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn from_index(index: i64) -> Option<Axis> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| Self::RESOLVED.get(idx).copied())
    }

    pub fn index(self) -> Option<usize> {
        match self {
            Axis::Auto => None,
            Axis::X => Some(0),
            Axis::Y => Some(1),
            Axis::Z => Some(2),
        }
    }

    pub fn is_auto(self) -> bool {
        self == Axis::Auto
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoopType {
    #[default]
    Regular,
    Inner,
    Outer,
}

/// Which of the two loops synthesized by `@tile` a binding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopOrder {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AttributedLoop {
    #[serde(rename = "type")]
    pub loop_type: LoopType,
    pub axis: Axis,
}

impl AttributedLoop {
    pub fn regular() -> Self {
        Self::default()
    }

    pub fn inner(axis: Axis) -> Self {
        Self {
            loop_type: LoopType::Inner,
            axis,
        }
    }

    pub fn outer(axis: Axis) -> Self {
        Self {
            loop_type: LoopType::Outer,
            axis,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.loop_type != LoopType::Regular
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileParams {
    /// Tile size as written, e.g. `16` or `BLOCK * 2`.
    pub tile_size: String,
    pub first_loop: AttributedLoop,
    pub second_loop: AttributedLoop,
    pub check: bool,
}

impl TileParams {
    pub fn new(tile_size: impl Into<String>) -> Self {
        Self {
            tile_size: tile_size.into(),
            first_loop: AttributedLoop::regular(),
            second_loop: AttributedLoop::regular(),
            check: true,
        }
    }

    pub fn loop_for(&self, order: LoopOrder) -> &AttributedLoop {
        match order {
            LoopOrder::First => &self.first_loop,
            LoopOrder::Second => &self.second_loop,
        }
    }

    pub fn loops(&self) -> [AttributedLoop; 2] {
        [self.first_loop, self.second_loop]
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum BarrierScope {
    #[default]
    Local,
    Global,
}

/// Parsed form of one attribute occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedParams {
    Empty,
    Loop(AttributedLoop),
    Tile(TileParams),
    Barrier(BarrierScope),
}

impl ParsedParams {
    /// Sub-loop bindings of a loop attribute: one for `@outer`/`@inner`,
    /// two for `@tile`, none otherwise.
    pub fn loop_bindings(&self) -> Vec<AttributedLoop> {
        match self {
            ParsedParams::Loop(attributed) => vec![*attributed],
            ParsedParams::Tile(tile) => tile.loops().to_vec(),
            ParsedParams::Empty | ParsedParams::Barrier(_) => Vec::new(),
        }
    }

    pub fn as_loop(&self) -> Option<&AttributedLoop> {
        match self {
            ParsedParams::Loop(attributed) => Some(attributed),
            _ => None,
        }
    }

    pub fn as_tile(&self) -> Option<&TileParams> {
        match self {
            ParsedParams::Tile(tile) => Some(tile),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_indices() {
        assert_eq!(Axis::from_index(0), Some(Axis::X));
        assert_eq!(Axis::from_index(2), Some(Axis::Z));
        assert_eq!(Axis::from_index(3), None);
        assert_eq!(Axis::from_index(-1), None);
        assert_eq!(Axis::Y.index(), Some(1));
        assert_eq!(Axis::Auto.index(), None);
    }

    #[test]
    fn tile_bindings_follow_order_tags() {
        let mut tile = TileParams::new("16");
        tile.first_loop = AttributedLoop::outer(Axis::Auto);
        tile.second_loop = AttributedLoop::inner(Axis::X);
        assert_eq!(tile.loop_for(LoopOrder::First).loop_type, LoopType::Outer);
        assert_eq!(tile.loop_for(LoopOrder::Second).axis, Axis::X);
        assert_eq!(ParsedParams::Tile(tile).loop_bindings().len(), 2);
    }
}
