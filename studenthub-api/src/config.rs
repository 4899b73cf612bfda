use serde::Deserialize;
use std::{
    fmt::{Debug, Formatter},
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};
use studenthub_common::util::PositiveDuration;
use thiserror::Error;
use time::Duration;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("{variable} has to be a positive number of seconds")]
pub struct InvalidTtlError {
    variable: &'static str,
}

/// Process configuration, read from the environment.
#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,
    pub database_url: String,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    pub jwt_secret: String,
    #[serde(default = "default_access_token_ttl_seconds")]
    pub access_token_ttl_seconds: u32,
    #[serde(default = "default_refresh_token_ttl_seconds")]
    pub refresh_token_ttl_seconds: u32,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub mail_relay_url: Option<String>,
    #[serde(default = "default_mail_sender")]
    pub mail_sender: String,
    #[serde(default = "default_mail_workers")]
    pub mail_workers: usize,
    #[serde(default = "default_mail_queue_capacity")]
    pub mail_queue_capacity: usize,
}

fn default_database_max_connections() -> u32 {
    10
}

fn default_access_token_ttl_seconds() -> u32 {
    15 * 60
}

fn default_refresh_token_ttl_seconds() -> u32 {
    30 * 24 * 60 * 60
}

fn default_media_root() -> PathBuf {
    PathBuf::from("./media")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_mail_sender() -> String {
    "noreply@studenthub.com".to_owned()
}

fn default_mail_workers() -> usize {
    2
}

fn default_mail_queue_capacity() -> usize {
    256
}

fn ttl(variable: &'static str, seconds: u32) -> Result<PositiveDuration, InvalidTtlError> {
    PositiveDuration::new(Duration::seconds(i64::from(seconds))).ok_or(InvalidTtlError { variable })
}

impl Env {
    #[must_use]
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }

    pub fn access_token_ttl(&self) -> Result<PositiveDuration, InvalidTtlError> {
        ttl("ACCESS_TOKEN_TTL_SECONDS", self.access_token_ttl_seconds)
    }

    pub fn refresh_token_ttl(&self) -> Result<PositiveDuration, InvalidTtlError> {
        ttl("REFRESH_TOKEN_TTL_SECONDS", self.refresh_token_ttl_seconds)
    }
}

impl Debug for Env {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("server_address", &self.server_address)
            .field("server_port", &self.server_port)
            .field("database_max_connections", &self.database_max_connections)
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("media_root", &self.media_root)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("mail_relay_url", &self.mail_relay_url)
            .field("mail_sender", &self.mail_sender)
            .field("mail_workers", &self.mail_workers)
            .field("mail_queue_capacity", &self.mail_queue_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Env;
    use std::path::PathBuf;

    fn vars(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        [
            ("SERVER_ADDRESS", "127.0.0.1"),
            ("SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/studenthub"),
            ("JWT_SECRET", "hunter2"),
        ]
        .iter()
        .chain(extra)
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
    }

    #[test]
    fn defaults_apply() {
        let env: Env = envy::from_iter(vars(&[])).unwrap();

        assert_eq!(env.socket_address().to_string(), "127.0.0.1:8080");
        assert_eq!(env.database_max_connections, 10);
        assert_eq!(env.access_token_ttl().unwrap().whole_seconds(), 900);
        assert_eq!(env.refresh_token_ttl().unwrap().whole_seconds(), 2_592_000);
        assert_eq!(env.media_root, PathBuf::from("./media"));
        assert_eq!(env.max_upload_bytes, 10_485_760);
        assert_eq!(env.mail_relay_url, None);
        assert_eq!(env.mail_sender, "noreply@studenthub.com");
        assert_eq!(env.mail_workers, 2);
        assert_eq!(env.mail_queue_capacity, 256);
    }

    #[test]
    fn overrides_apply() {
        let env: Env = envy::from_iter(vars(&[
            ("MAIL_RELAY_URL", "http://relay.local/send"),
            ("MAIL_WORKERS", "4"),
            ("ACCESS_TOKEN_TTL_SECONDS", "60"),
        ]))
        .unwrap();

        assert_eq!(env.mail_relay_url.as_deref(), Some("http://relay.local/send"));
        assert_eq!(env.mail_workers, 4);
        assert_eq!(env.access_token_ttl().unwrap().whole_seconds(), 60);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let env: Env = envy::from_iter(vars(&[("REFRESH_TOKEN_TTL_SECONDS", "0")])).unwrap();
        assert!(env.refresh_token_ttl().is_err());
    }

    #[test]
    fn missing_secret_fails() {
        let without_secret = vars(&[])
            .into_iter()
            .filter(|(key, _)| key != "JWT_SECRET");
        assert!(envy::from_iter::<_, Env>(without_secret).is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let env: Env = envy::from_iter(vars(&[])).unwrap();
        let debug = format!("{env:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("postgres://"));
    }
}
