use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crate::optimizer::{PlacementConfig, PlacementStrategy};
use crate::store::RestStoreConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub placement: PlacementConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(env_string)
    }

    /// Creates a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig::from_lookup(&lookup),
            store: StoreConfig::from_lookup(&lookup),
            placement: placement_from_lookup(&lookup),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "CELLAR_API_HOST";
    const PORT_VAR: &'static str = "CELLAR_API_PORT";

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let default_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let host_value = lookup(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                log::warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (default_ip, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match lookup(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    log::warn!(
                        "⚠️ {} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    log::warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Which store backs the service.
#[derive(Clone, Debug)]
pub enum StoreConfig {
    /// Hosted backend reached over HTTPS.
    Rest(RestStoreConfig),
    /// Process-local store, optionally seeded with the demo cellar.
    InMemory { demo_data: bool },
}

impl StoreConfig {
    const URL_VAR: &'static str = "CELLAR_STORE_URL";
    const API_KEY_VAR: &'static str = "CELLAR_STORE_API_KEY";
    const TIMEOUT_VAR: &'static str = "CELLAR_STORE_TIMEOUT_SECS";
    const DEMO_VAR: &'static str = "CELLAR_DEMO_DATA";

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let Some(base_url) = lookup(Self::URL_VAR) else {
            let demo_data = lookup(Self::DEMO_VAR)
                .and_then(|raw| parse_bool(&raw, Self::DEMO_VAR))
                .unwrap_or(true);
            return StoreConfig::InMemory { demo_data };
        };

        if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
            log::warn!(
                "⚠️ {} ('{}') has no http(s) scheme; requests will likely fail.",
                Self::URL_VAR,
                base_url
            );
        }

        let mut config = RestStoreConfig::new(base_url);
        config.api_key = lookup(Self::API_KEY_VAR);
        if config.api_key.is_none() {
            log::warn!(
                "⚠️ {} is set but {} is missing. Requests are sent unauthenticated.",
                Self::URL_VAR,
                Self::API_KEY_VAR
            );
        }
        let timeout = load_u64_with_warning(
            lookup,
            Self::TIMEOUT_VAR,
            RestStoreConfig::DEFAULT_TIMEOUT_SECS,
            |value| value > 0,
            "must be greater than 0",
        );
        config.timeout = Duration::from_secs(timeout);
        StoreConfig::Rest(config)
    }
}

const STRATEGY_VAR: &str = "CELLAR_DEFAULT_STRATEGY";
const CONCURRENCY_VAR: &str = "CELLAR_PERSIST_CONCURRENCY";

fn placement_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> PlacementConfig {
    let default_strategy = match lookup(STRATEGY_VAR) {
        Some(raw) => match raw.parse::<PlacementStrategy>() {
            Ok(strategy) => strategy,
            Err(err) => {
                log::warn!(
                    "⚠️ {}: {}. Using {}.",
                    STRATEGY_VAR,
                    err,
                    PlacementConfig::DEFAULT_STRATEGY
                );
                PlacementConfig::DEFAULT_STRATEGY
            }
        },
        None => PlacementConfig::DEFAULT_STRATEGY,
    };

    let concurrency = load_u64_with_warning(
        lookup,
        CONCURRENCY_VAR,
        PlacementConfig::DEFAULT_PERSIST_CONCURRENCY as u64,
        |value| (1..=PlacementConfig::MAX_PERSIST_CONCURRENCY as u64).contains(&value),
        "must be between 1 and 32",
    );
    if concurrency > 1 {
        log::info!(
            "⚠️ Writing up to {} assignments concurrently ({} = {}).",
            concurrency,
            CONCURRENCY_VAR,
            concurrency
        );
    }

    PlacementConfig::builder()
        .default_strategy(default_strategy)
        .persist_concurrency(concurrency as usize)
        .build()
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => trimmed(value),
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            log::warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name,
                err
            );
            None
        }
    }
}

fn trimmed(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            log::warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name,
                other
            );
            None
        }
    }
}

fn load_u64_with_warning(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: u64,
    validator: impl Fn(u64) -> bool,
    invalid_hint: &str,
) -> u64 {
    match lookup(var_name) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if validator(value) => value,
            Ok(_) => {
                log::warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {}.",
                    var_name,
                    raw,
                    invalid_hint,
                    default
                );
                default
            }
            Err(err) => {
                log::warn!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name,
                    raw,
                    err,
                    default
                );
                default
            }
        },
        None => default,
    }
}
