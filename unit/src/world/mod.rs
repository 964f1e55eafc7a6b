pub use chunk_location::*;
pub use height_range::*;

mod chunk_location;
mod height_range;
