pub mod channel_dto;
pub mod cookie_dto;
pub mod health_dto;
pub mod stream_dto;
