//! Settings type definitions with compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Network and CORS settings.
    pub server: ServerSettings,
    /// Token signing settings.
    pub auth: AuthSettings,
    /// Per-client request budgets.
    pub rate_limit: RateLimitSettings,
    /// Chunked delivery tuning.
    pub streaming: StreamingSettings,
    /// Upstream memory store settings.
    pub gateway: GatewaySettings,
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Allowed CORS origins; empty permits any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

/// Token signing settings.
///
/// The compiled default secret exists so the service can boot in
/// development; deployments override it via `MNEMO_JWT_SECRET`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC signing secret.
    pub jwt_secret: String,
    /// Signing algorithm name (`HS256`, `HS384`, or `HS512`).
    pub jwt_algorithm: String,
    /// Access token lifetime in minutes.
    pub access_token_expire_minutes: i64,
    /// Refresh token lifetime in days.
    pub refresh_token_expire_days: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me".to_string(),
            jwt_algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
        }
    }
}

/// Sliding-window rate limit budgets.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// HTTP requests allowed per client per window.
    pub http_limit: usize,
    /// WebSocket messages allowed per client per window.
    pub ws_limit: usize,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            http_limit: 100,
            ws_limit: 50,
            window_secs: 60,
        }
    }
}

/// Chunked content delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingSettings {
    /// Characters per chunk.
    pub chunk_size: usize,
    /// Pause between chunks in milliseconds.
    pub chunk_delay_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            chunk_delay_ms: 50,
        }
    }
}

/// Upstream memory store settings.
///
/// When `base_url` is unset the service runs against its built-in
/// in-memory store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Base URL of the upstream store, e.g. `http://localhost:9200`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 8000);
        assert!(s.cors_origins.is_empty());
    }

    #[test]
    fn auth_defaults() {
        let a = AuthSettings::default();
        assert_eq!(a.jwt_algorithm, "HS256");
        assert_eq!(a.access_token_expire_minutes, 30);
        assert_eq!(a.refresh_token_expire_days, 7);
    }

    #[test]
    fn rate_limit_defaults() {
        let r = RateLimitSettings::default();
        assert_eq!(r.http_limit, 100);
        assert_eq!(r.ws_limit, 50);
        assert_eq!(r.window_secs, 60);
    }

    #[test]
    fn streaming_defaults() {
        let s = StreamingSettings::default();
        assert_eq!(s.chunk_size, 100);
        assert_eq!(s.chunk_delay_ms, 50);
    }

    #[test]
    fn gateway_defaults_to_in_memory() {
        let g = GatewaySettings::default();
        assert!(g.base_url.is_none());
        assert_eq!(g.timeout_secs, 30);
    }

    #[test]
    fn serde_camel_case() {
        let s = Settings::default();
        let json = serde_json::to_value(&s).unwrap();
        assert!(json["rateLimit"].get("httpLimit").is_some());
        assert!(json["auth"].get("jwtSecret").is_some());
        assert!(json["streaming"].get("chunkDelayMs").is_some());
    }

    #[test]
    fn gateway_omits_unset_base_url() {
        let json = serde_json::to_value(GatewaySettings::default()).unwrap();
        assert!(json.get("baseUrl").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = serde_json::json!({"port": 9000});
        let s: ServerSettings = serde_json::from_value(json).unwrap();
        assert_eq!(s.port, 9000);
        assert_eq!(s.host, "0.0.0.0");
    }
}
