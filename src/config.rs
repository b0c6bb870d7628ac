use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Broadcast buffer per topic. Slow subscribers past this lag and skip.
    pub room_capacity: usize,
    /// Pending events per socket before the forwarder waits.
    pub outbox_capacity: usize,
    pub history_page_size: u32,
    pub history_max_page: u32,
    pub session_idle_minutes: i64,
    /// Shared secret for `POST /notifications`. `None` leaves it open.
    pub trigger_token: Option<String>,
    /// Shared secret the auth collaborator presents on `POST /session`.
    pub session_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite://mindquest.db?mode=rwc".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            room_capacity: 64,
            outbox_capacity: 64,
            history_page_size: 30,
            history_max_page: 100,
            session_idle_minutes: 5,
            trigger_token: None,
            session_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|var| dotenv::var(var).ok())
    }

    /// Builds a config from any key lookup. Missing keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        parse_into(&lookup, "ROOM_CAPACITY", &mut config.room_capacity)?;
        parse_into(&lookup, "OUTBOX_CAPACITY", &mut config.outbox_capacity)?;
        parse_into(&lookup, "HISTORY_PAGE_SIZE", &mut config.history_page_size)?;
        parse_into(&lookup, "HISTORY_MAX_PAGE", &mut config.history_max_page)?;
        parse_into(&lookup, "SESSION_IDLE_MINUTES", &mut config.session_idle_minutes)?;
        config.trigger_token = lookup("TRIGGER_TOKEN").filter(|token| !token.is_empty());
        config.session_token = lookup("SESSION_TOKEN").filter(|token| !token.is_empty());

        if config.room_capacity == 0 {
            return Err(invalid("ROOM_CAPACITY", "0", "must be positive"));
        }
        if config.outbox_capacity == 0 {
            return Err(invalid("OUTBOX_CAPACITY", "0", "must be positive"));
        }
        if config.history_page_size == 0 || config.history_page_size > config.history_max_page {
            return Err(invalid(
                "HISTORY_PAGE_SIZE",
                &config.history_page_size.to_string(),
                "must be between 1 and HISTORY_MAX_PAGE",
            ));
        }

        Ok(config)
    }

    /// Clamps a requested page size into `[1, history_max_page]`.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.history_page_size)
            .clamp(1, self.history_max_page)
    }
}

fn parse_into<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(var) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string()))?;
    }
    Ok(())
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.history_page_size, 30);
        assert!(config.trigger_token.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("ROOM_CAPACITY", "8"),
            ("HISTORY_PAGE_SIZE", " 10 "),
            ("TRIGGER_TOKEN", "s3cret"),
            ("SESSION_TOKEN", ""),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.room_capacity, 8);
        assert_eq!(config.history_page_size, 10);
        assert_eq!(config.trigger_token.as_deref(), Some("s3cret"));
        assert!(config.session_token.is_none());
    }

    #[test]
    fn bad_number_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("OUTBOX_CAPACITY", "lots")])).unwrap_err();
        assert!(err.to_string().starts_with("OUTBOX_CAPACITY"));
    }

    #[test]
    fn page_size_above_max_is_rejected() {
        let err = Config::from_lookup(lookup(&[("HISTORY_PAGE_SIZE", "500")])).unwrap_err();
        assert!(err.to_string().contains("HISTORY_PAGE_SIZE"));
    }

    #[test]
    fn page_limit_clamps() {
        let config = Config::default();
        assert_eq!(config.page_limit(None), 30);
        assert_eq!(config.page_limit(Some(0)), 1);
        assert_eq!(config.page_limit(Some(1000)), 100);
    }
}
