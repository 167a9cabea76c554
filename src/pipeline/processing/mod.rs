// Pipeline processing: normalization, genre resolution, cleaning, deduplication,
// explosion and star-schema mapping

pub mod catalog;
pub mod dedup;
pub mod explode;
pub mod genre;
pub mod normalize;
pub mod quality_gate;
