//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `MASTER_KEY` — shared secret for workflow endpoints
/// - `WEBHOOK_SECRET` — shared secret for the payment-processor webhook
/// - `PUBLIC_BASE_URL` — customer-facing base URL for guarantee links
/// - `BOOKING_WEBHOOK_URL` — calendar-workflow endpoint for the hand-off
/// - `DATABASE_URL` — optional PostgreSQL connection string
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub master_key: String,
    pub webhook_secret: String,
    pub public_base_url: String,
    pub booking_webhook_url: String,
    pub database_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            master_key: std::env::var("MASTER_KEY")
                .unwrap_or_else(|_| "dev-master-key".to_string()),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "dev-webhook-secret".to_string()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            booking_webhook_url: std::env::var("BOOKING_WEBHOOK_URL")
                .unwrap_or_else(|_| "http://localhost:5678/webhook/booking".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            master_key: "dev-master-key".to_string(),
            webhook_secret: "dev-webhook-secret".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            booking_webhook_url: "http://localhost:5678/webhook/booking".to_string(),
            database_url: None,
        }
    }
}
