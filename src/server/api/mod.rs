pub mod admin_controller;
pub mod health_controller;
pub mod playlist_controller;
pub mod proxy_controller;
pub mod stream_controller;
