pub mod assets;
pub mod auth;
pub mod object_storage;
pub mod probe;
pub mod video_service;
