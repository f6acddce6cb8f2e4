use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub machine_id: u8,
    pub payment_secret: String,
    pub payment_tmn_code: String,
    pub payment_gateway_url: String,
    pub payment_return_url: String,
    /// Empty string disables the external push bridge
    pub push_api_url: String,
    pub push_api_key: String,
    pub close_scan_secs: u64,
    pub anti_snipe_window_secs: i64,
    pub anti_snipe_extend_secs: i64,
    pub update_channel_capacity: usize,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("listen_addr", "0.0.0.0:3000")?
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/bidhouse.log")?
        .set_default("machine_id", 1)?
        .set_default("payment_secret", "change-me")?
        .set_default("payment_tmn_code", "BIDHOUSE")?
        .set_default("payment_gateway_url", "https://sandbox.gateway.local/paymentv2")?
        .set_default("payment_return_url", "http://localhost:3000/api/payment/gateway_return")?
        .set_default("push_api_url", "")?
        .set_default("push_api_key", "")?
        .set_default("close_scan_secs", 60)?
        .set_default("anti_snipe_window_secs", 300)?
        .set_default("anti_snipe_extend_secs", 300)?
        .set_default("update_channel_capacity", 1024)?
        // Add configuration from a file
        .add_source(File::with_name("config/config.yaml").required(false))
        // Add configuration from environment variables
        .add_source(config::Environment::with_prefix("APP"))
        .build()?;

    s.try_deserialize()
}
