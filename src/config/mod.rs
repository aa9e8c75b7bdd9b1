use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Startup configuration errors. Both are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub site: SiteConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub profile_timeout_ms: u64,
    pub persist_session: bool,
    pub auto_refresh_token: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public origin of the app; password reset links point back here.
    pub site_url: String,
    pub allowed_email_domain: Option<String>,
}

/// The web binary holds one operator's session, so it only ever listens on
/// a loopback address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl SessionConfig {
    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }
}

impl SiteConfig {
    pub fn reset_password_url(&self) -> String {
        format!("{}/reset-password", self.site_url.trim_end_matches('/'))
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let url = lookup("SUPABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let anon_key = lookup("SUPABASE_ANON_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;

        let url = Url::parse(url.trim()).map_err(|e| ConfigError::Invalid {
            name: "SUPABASE_URL",
            reason: e.to_string(),
        })?;

        let backend = BackendConfig {
            url,
            anon_key,
            request_timeout_secs: 30,
        };

        // Set defaults based on environment, then override with specific env vars
        let config = match environment {
            Environment::Production => Self::production(backend),
            Environment::Development => Self::development(backend),
        };

        let mut config = config.with_overrides(&lookup);
        if let Some(v) = lookup("PROMPTDECK_HOST") {
            config.server.host = loopback_host(&v)?;
        }
        Ok(config)
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PROMPTDECK_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = v.parse().unwrap_or(self.backend.request_timeout_secs);
        }

        if let Some(v) = lookup("PROMPTDECK_PROFILE_TIMEOUT_MS") {
            self.session.profile_timeout_ms = v.parse().unwrap_or(self.session.profile_timeout_ms);
        }
        if let Some(v) = lookup("PROMPTDECK_PERSIST_SESSION") {
            self.session.persist_session = v.parse().unwrap_or(self.session.persist_session);
        }
        if let Some(v) = lookup("PROMPTDECK_AUTO_REFRESH_TOKEN") {
            self.session.auto_refresh_token = v.parse().unwrap_or(self.session.auto_refresh_token);
        }

        if let Some(v) = lookup("PROMPTDECK_SITE_URL") {
            self.site.site_url = v;
        }
        if let Some(v) = lookup("PROMPTDECK_EMAIL_DOMAIN") {
            let domain = v.trim().trim_start_matches('@').to_ascii_lowercase();
            self.site.allowed_email_domain = if domain.is_empty() { None } else { Some(domain) };
        }

        // Allow tests or deployments to override port via env
        if let Some(v) = lookup("PROMPTDECK_PORT").or_else(|| lookup("PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = lookup("SECURITY_ENABLE_CORS") {
            self.server.enable_cors = v.parse().unwrap_or(self.server.enable_cors);
        }
        if let Some(v) = lookup("SECURITY_CORS_ORIGINS") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    fn development(backend: BackendConfig) -> Self {
        Self {
            environment: Environment::Development,
            backend,
            session: SessionConfig {
                profile_timeout_ms: 5_000,
                persist_session: true,
                auto_refresh_token: true,
            },
            site: SiteConfig {
                site_url: "http://localhost:3000".to_string(),
                allowed_email_domain: None,
            },
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 3000,
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn production(backend: BackendConfig) -> Self {
        Self {
            environment: Environment::Production,
            backend: BackendConfig { request_timeout_secs: 10, ..backend },
            session: SessionConfig {
                profile_timeout_ms: 5_000,
                persist_session: true,
                auto_refresh_token: true,
            },
            site: SiteConfig {
                site_url: "http://localhost:8080".to_string(),
                allowed_email_domain: None,
            },
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 8080,
                enable_cors: false,
                cors_origins: vec![],
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn loopback_host(value: &str) -> Result<IpAddr, ConfigError> {
    let host: IpAddr = value.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
        name: "PROMPTDECK_HOST",
        reason: e.to_string(),
    })?;
    if !host.is_loopback() {
        return Err(ConfigError::Invalid {
            name: "PROMPTDECK_HOST",
            reason: format!("{} is not a loopback address; the server holds a single local session", host),
        });
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_missing_url_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_URL")));
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x.supabase.co")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_ANON_KEY")));
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_ANON_KEY")));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "not a url"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SUPABASE_URL", .. }));
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.session.profile_timeout(), Duration::from_secs(5));
        assert_eq!(config.site.reset_password_url(), "http://localhost:3000/reset-password");
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("APP_ENV", "production"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("PROMPTDECK_PROFILE_TIMEOUT_MS", "250"),
            ("PROMPTDECK_EMAIL_DOMAIN", "@Example.com"),
            ("PORT", "9000"),
        ]))
        .unwrap();
        assert!(config.is_production());
        assert_eq!(config.session.profile_timeout_ms, 250);
        assert_eq!(config.site.allowed_email_domain.as_deref(), Some("example.com"));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_server_listens_on_loopback_only() {
        let base = [("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_ANON_KEY", "anon")];
        let config = AppConfig::from_lookup(lookup_from(&base)).unwrap();
        assert!(config.server.host.is_loopback());

        let production = AppConfig::from_lookup(lookup_from(&[base[0], base[1], ("APP_ENV", "production")])).unwrap();
        assert!(production.server.host.is_loopback());
        assert!(!production.server.enable_cors);

        let ipv6 = AppConfig::from_lookup(lookup_from(&[base[0], base[1], ("PROMPTDECK_HOST", "::1")])).unwrap();
        assert_eq!(ipv6.server.host, "::1".parse::<IpAddr>().unwrap());

        for host in ["0.0.0.0", "192.168.1.20", "localhost"] {
            let err = AppConfig::from_lookup(lookup_from(&[base[0], base[1], ("PROMPTDECK_HOST", host)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "PROMPTDECK_HOST", .. }), "{}", host);
        }
    }
}
