mod marker;

pub use marker::{paint_marker, MarkerDecoder};
