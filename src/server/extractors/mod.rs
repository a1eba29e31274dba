mod client_context_extractor;

pub use client_context_extractor::*;
