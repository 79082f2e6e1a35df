use crate::{service::export::ExportLocale, utils::currency::CurrencyFormat};

#[derive(Debug, Clone)]
pub struct Config {
    pub upstream_api_url: String,
    pub upstream_api_token: Option<String>,
    pub upstream_timeout_secs: u64,
    pub port: u16,
    pub currency: CurrencyFormat,
    pub export_locale: ExportLocale,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn init() -> Result<Config, String> {
        let upstream_api_url = std::env::var("UPSTREAM_API_URL")
            .map_err(|_| "UPSTREAM_API_URL must be set".to_string())?;

        let upstream_api_token = std::env::var("UPSTREAM_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        let upstream_timeout_secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse::<u64>()
            .map_err(|e| format!("UPSTREAM_TIMEOUT_SECS must be a number: {}", e))?;

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("PORT must be a valid port: {}", e))?;

        // Display settings (with defaults)
        let currency_suffix = std::env::var("CURRENCY_SUFFIX")
            .unwrap_or_else(|_| "$".to_string());
        let export_locale = std::env::var("EXPORT_LOCALE")
            .unwrap_or_else(|_| "en".to_string())
            .parse::<ExportLocale>()?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            upstream_api_url: upstream_api_url.trim_end_matches('/').to_string(),
            upstream_api_token,
            upstream_timeout_secs,
            port,
            currency: CurrencyFormat::new(currency_suffix),
            export_locale,
            allowed_origins,
        })
    }
}
