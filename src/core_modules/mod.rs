pub mod difference_scorer;
pub mod error;
pub mod intensity;
pub mod pixel_buffer;
