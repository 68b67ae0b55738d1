use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{DocumentKind, DEFAULT_CURRENCY};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentsConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    #[serde(default)]
    pub company: CompanyConfig,
    #[serde(default)]
    pub currency: CurrencyConfig,
    #[serde(default)]
    pub pricing: PricingDefaults,
    #[serde(default)]
    pub numbering: NumberingConfig,
    #[serde(default)]
    pub autosave: AutosaveSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

/// Letterhead printed on exported documents.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            name: "Construction Co.".to_string(),
            address: None,
            phone: None,
            email: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    /// ISO 4217 code for new documents.
    pub code: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            code: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// Rates applied to new documents when the request leaves them out.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingDefaults {
    pub labour_rate: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingDefaults {
    fn default() -> Self {
        Self {
            labour_rate: Decimal::from(36),
            tax_rate: Decimal::from(16),
        }
    }
}

/// Document number prefixes and where sequences resume.
///
/// Counters live in memory. After a restart against a persistent store, list
/// the last issued sequence per kind and year under `continue_from`, or
/// numbers are issued again from 1.
#[derive(Debug, Clone, Deserialize)]
pub struct NumberingConfig {
    pub invoice_prefix: String,
    pub quotation_prefix: String,
    #[serde(default)]
    pub continue_from: Vec<SequenceSeed>,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV".to_string(),
            quotation_prefix: "QT".to_string(),
            continue_from: Vec::new(),
        }
    }
}

/// Last sequence already issued for one kind and year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SequenceSeed {
    pub kind: DocumentKind,
    pub year: i32,
    pub last_sequence: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutosaveSettings {
    pub enabled: bool,
    pub delay_ms: u64,
    pub failure_threshold: u32,
    pub backup_interval_secs: u64,
    pub backup_max_age_hours: u64,
    pub save_timeout_secs: u64,
    /// Directory for crash-recovery backups; kept in memory when unset.
    pub backup_dir: Option<PathBuf>,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 2000,
            failure_threshold: 3,
            backup_interval_secs: 30,
            backup_max_age_hours: 24,
            save_timeout_secs: 30,
            backup_dir: None,
        }
    }
}

impl AutosaveSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn backup_max_age(&self) -> Duration {
        Duration::from_secs(self.backup_max_age_hours * 3600)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.save_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Base URL of the document API, e.g. `http://records:8080/api`.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            base_url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "smtp.gmail.com".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Accounts".to_string(),
        }
    }
}

impl DocumentsConfig {
    pub fn load() -> Result<Self, AppError> {
        let config: Self = core_config::load_layered()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), AppError> {
        if self.store.backend == StoreBackend::Http && self.store.base_url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "store.base_url is required when store.backend is http"
            )));
        }
        if self.pricing.labour_rate.is_sign_negative() || self.pricing.tax_rate.is_sign_negative() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "default rates must not be negative"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: DocumentsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.common.port, 8080);
        assert_eq!(config.currency.code, "KES");
        assert_eq!(config.pricing.labour_rate, Decimal::from(36));
        assert_eq!(config.pricing.tax_rate, Decimal::from(16));
        assert_eq!(config.autosave.delay(), Duration::from_secs(2));
        assert_eq!(config.autosave.backup_max_age(), Duration::from_secs(24 * 3600));
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_http_store_requires_base_url() {
        let mut config = DocumentsConfig::default();
        config.store.backend = StoreBackend::Http;
        assert!(config.check().is_err());

        config.store.base_url = Some("http://localhost:9000".to_string());
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_numbering_seeds_deserialize() {
        let config: DocumentsConfig = serde_json::from_str(
            r#"{"numbering": {"invoice_prefix": "INV", "quotation_prefix": "QT",
                "continue_from": [{"kind": "invoice", "year": 2024, "last_sequence": 57}]}}"#,
        )
        .unwrap();
        assert_eq!(
            config.numbering.continue_from,
            vec![SequenceSeed {
                kind: DocumentKind::Invoice,
                year: 2024,
                last_sequence: 57,
            }]
        );
    }
}
