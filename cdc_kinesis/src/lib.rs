pub mod conversions;
pub mod handler;
pub mod pipeline;
