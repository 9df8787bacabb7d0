use std::{error::Error, path::PathBuf, str::FromStr};

pub const SERVICE_NAME: &str = "f1-insight-ml-service";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub cache_dir: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub allowed_origins: Vec<String>,
    pub openf1_base_url: String,
    pub ergast_base_url: String,
    pub cache_ttl_secs: i64,
    pub reference_data_path: Option<PathBuf>,
    pub current_season: Option<i32>,
    pub run_migrations: bool,
    pub upstream_max_concurrent: usize,
    pub upstream_min_delay_ms: u64,
    pub upstream_timeout_secs: u64,
}

impl Config {
    pub fn init() -> Result<Self, Box<dyn Error>> {
        let cache_dir = PathBuf::from(var_or("FASTF1_CACHE_DIR", "./cache"));
        std::fs::create_dir_all(&cache_dir)?;

        Ok(Config {
            db_url: var_or("DATABASE_URL", "postgresql://localhost/f1_insight_hub"),
            cache_dir,
            port: parse_var("PORT", 8000)?,
            log_level: var_or("LOG_LEVEL", "INFO"),
            allowed_origins: var_or("ALLOWED_ORIGINS", "http://localhost:3001")
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            openf1_base_url: var_or("OPENF1_BASE_URL", "https://api.openf1.org/v1"),
            ergast_base_url: var_or("ERGAST_BASE_URL", "https://api.jolpi.ca/ergast/f1"),
            cache_ttl_secs: parse_var("CACHE_TTL_SECS", 24 * 60 * 60)?,
            reference_data_path: std::env::var("REFERENCE_DATA_PATH").ok().map(PathBuf::from),
            current_season: match std::env::var("CURRENT_SEASON") {
                Ok(raw) => Some(raw.trim().parse()?),
                Err(_) => None,
            },
            run_migrations: parse_var("RUN_MIGRATIONS", false)?,
            upstream_max_concurrent: parse_var("UPSTREAM_MAX_CONCURRENT", 2)?,
            upstream_min_delay_ms: parse_var("UPSTREAM_MIN_DELAY_MS", 250)?,
            upstream_timeout_secs: parse_var("UPSTREAM_TIMEOUT_SECS", 30)?,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: Error + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| format!("{key}: {e}").into()),
        Err(_) => Ok(default),
    }
}
