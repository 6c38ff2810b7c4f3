// Public API
pub use dart::{
    is_single_dart_finish, segment_distance, Dart, DartError, OutshotType, BOARD_ORDER, BULL,
};
pub use visit::{Darts, Visit};

// Internal modules
mod dart;
mod visit;
