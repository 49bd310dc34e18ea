use std::env;
use std::str::FromStr;

use anyhow::Context;

/// Figures the statistics engine needs that vary between deployments.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Money saved per generated kWh.
    pub rate_per_unit: f64,
    /// Expected daily yield of the installation in kWh; efficiency is measured against it.
    pub optimal_generation: f64,
    /// When false every account shares one household reading history.
    pub multi_tenant: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            rate_per_unit: 15.0,
            optimal_generation: 30.0,
            multi_tenant: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub sqlite_path: String,
    pub cors_origin: String,
    pub secure_cookies: bool,
    pub rate_limit: bool,
    pub allow_backdated_readings: bool,
    pub stats: StatsConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = StatsConfig::default();

        Ok(Self {
            server_port: parse_var("SERVER_PORT", 4000)?,
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/solarmeter.db".to_string()),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            secure_cookies: parse_var("SECURE_COOKIES", false)?,
            rate_limit: parse_var("RATE_LIMIT", true)?,
            allow_backdated_readings: parse_var("ALLOW_BACKDATED_READINGS", true)?,
            stats: StatsConfig {
                rate_per_unit: parse_var("RATE_PER_UNIT", defaults.rate_per_unit)?,
                optimal_generation: parse_var("OPTIMAL_GENERATION", defaults.optimal_generation)?,
                multi_tenant: parse_var("MULTI_TENANT", defaults.multi_tenant)?,
            },
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
