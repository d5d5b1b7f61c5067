pub mod health_handlers;
pub mod video_handlers;
