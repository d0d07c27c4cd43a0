//! Safe bounding box types and functions.

mod common;

pub use transform::*;
mod transform;

pub use rect::*;
pub mod rect;

pub use tlbr::*;
pub mod tlbr;

pub use hw::*;
pub mod hw;

#[cfg(feature = "opencv")]
mod with_opencv;

pub mod prelude {
    pub use crate::rect::{Rect, RectNum};
}
