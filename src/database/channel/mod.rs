pub mod json_repository;
pub mod model;

pub use json_repository::JsonChannelRepository;
pub use model::*;
