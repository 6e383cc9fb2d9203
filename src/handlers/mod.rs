pub mod health_handlers;
pub mod image_handlers;
pub mod item_handlers;
pub mod match_handlers;
pub mod multipart;
