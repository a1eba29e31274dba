pub mod compression_utils;
pub mod url_utils;
