//! Tolerant text-to-value parsers for the loosely formatted CSV export columns.
//! Every parser returns `None` instead of failing on malformed input.
pub mod price;
pub mod rating;

pub use price::{parse_price, zero_price};
pub use rating::{parse_rating_count, parse_rating_value, RatingSummary};
