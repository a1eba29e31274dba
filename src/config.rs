use crate::server::services::channel_cookie_services::CHANNEL_COOKIE_TTL_SECONDS;

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

/// the user agent every credential gets bound to, the cdn checks it against the token so it has
/// to stay the same between derivation and playback
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36 Edg/139.0.0.0";

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    #[clap(long, env, default_value = "0.0.0.0")]
    pub host: String,

    // port that the app will bind to
    #[clap(long, env, default_value = "5052")]
    pub port: u16,

    // public url of this server, used when a fully qualified url has to be handed out (playlist
    // entries). leave empty to derive it from the request host
    #[clap(long, env)]
    pub public_url: Option<String>,

    // redis is the fast tier, if it's missing or down everything runs off the file cache
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // durable tier, one json file per key
    #[clap(long, env, default_value = "data/cache")]
    pub cache_dir: String,

    #[clap(long, env, default_value = "data/channels.json")]
    pub channels_file: String,

    // lifetime of a generated credential in seconds (12 hours)
    #[clap(long, env, default_value = "43200")]
    pub cookie_cache_ttl: u64,

    // how many credentials the shared pool tries to hold
    #[clap(long, env, default_value = "1")]
    pub cookie_pool_size: usize,

    // scheduled pool refresh (10 hours)
    #[clap(long, env, default_value = "36000")]
    pub cookie_refresh_interval: u64,

    // refresh early once the freshest credential has less than this left
    #[clap(long, env, default_value = "3600")]
    pub cookie_min_remaining: u64,

    // pause between derivations inside one refresh so we don't burst the platform
    #[clap(long, env, default_value = "2000")]
    pub cookie_generation_delay_ms: u64,

    // per channel credential ttl (10 hours)
    #[clap(long, env, default_value_t = CHANNEL_COOKIE_TTL_SECONDS)]
    pub channel_cookie_ttl: u64,

    #[clap(long, env, default_value = "3600")]
    pub platform_token_ttl: u64,

    // background loops
    #[clap(long, env, default_value = "300")]
    pub refresh_check_interval: u64,

    #[clap(long, env, default_value = "3600")]
    pub cache_sweep_interval: u64,

    // timeouts in seconds
    #[clap(long, env, default_value = "30")]
    pub upstream_timeout: u64,

    #[clap(long, env, default_value = "60")]
    pub browser_timeout: u64,

    // upstream platform, these only change if they move things around
    #[clap(long, env, default_value = "https://www.zee5.com")]
    pub platform_base_url: String,

    #[clap(long, env, default_value = "/live-tv/aaj-tak/0-9-aajtak")]
    pub platform_landing_path: String,

    #[clap(long, env, default_value = "https://spapi.zee5.com")]
    pub platform_api_url: String,

    // the channel the shared pool derives against
    #[clap(long, env, default_value = "0-9-aajtak")]
    pub probe_channel_id: String,

    #[clap(long, env, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // EnvFilter syntax, overrides the level picked from cargo_env
    #[clap(long, env)]
    pub log_level: Option<String>,

    #[clap(long, env)]
    pub log_json: bool,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    #[clap(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_debug_routes: bool,
}

impl AppConfig {
    pub fn landing_url(&self) -> String {
        format!(
            "{}{}",
            self.platform_base_url.trim_end_matches('/'),
            self.platform_landing_path
        )
    }
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            host: "0.0.0.0".to_string(),
            port: 5052,
            public_url: None,
            redis_url: Some("redis://localhost:6379".to_string()),
            cache_dir: "data/cache".to_string(),
            channels_file: "data/channels.json".to_string(),
            cookie_cache_ttl: 43200,
            cookie_pool_size: 1,
            cookie_refresh_interval: 36000,
            cookie_min_remaining: 3600,
            cookie_generation_delay_ms: 2000,
            channel_cookie_ttl: CHANNEL_COOKIE_TTL_SECONDS,
            platform_token_ttl: 3600,
            refresh_check_interval: 300,
            cache_sweep_interval: 3600,
            upstream_timeout: 30,
            browser_timeout: 60,
            platform_base_url: "https://www.zee5.com".to_string(),
            platform_landing_path: "/live-tv/aaj-tak/0-9-aajtak".to_string(),
            platform_api_url: "https://spapi.zee5.com".to_string(),
            probe_channel_id: "0-9-aajtak".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cors_origin: "*".to_string(),
            log_level: None,
            log_json: false,
            sentry_dsn: None,
            enable_debug_routes: true,
        }
    }
}
