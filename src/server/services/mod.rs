pub mod background_services;
pub mod browser_services;
pub mod channel_cookie_services;
pub mod cookie_pool_services;
pub mod derivation_services;
pub mod edge_services;
pub mod manifest_services;
pub mod stream_services;
pub mod token_services;

pub use browser_services::DynBrowserService;
pub use channel_cookie_services::DynChannelCookieService;
pub use cookie_pool_services::DynCookiePoolService;
pub use derivation_services::DynDerivationService;
pub use manifest_services::DynManifestService;
pub use stream_services::DynStreamsService;
