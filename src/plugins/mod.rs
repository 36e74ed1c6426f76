//! Pluggable authentication and content-scanning contracts (C6).

pub mod auth;
pub mod scan;

pub use auth::{AuthPlugin, AuthRequest, AuthResult, IpAuthPlugin, ProxyAuthPlugin};
pub use scan::{ContentScanPlugin, ExternalScanner, ScanOutcome};

use crate::config::{AuthPluginConfig, ScannerConfig};

pub fn build_auth_plugins(configs: &[AuthPluginConfig]) -> Vec<Box<dyn AuthPlugin>> {
    configs
        .iter()
        .map(|c| -> Box<dyn AuthPlugin> {
            match c {
                AuthPluginConfig::ProxyAuth => Box::new(ProxyAuthPlugin),
                AuthPluginConfig::Ip => Box::new(IpAuthPlugin),
            }
        })
        .collect()
}

pub fn build_scanner(config: &ScannerConfig) -> crate::Result<ExternalScanner> {
    let virus_regexp = match &config.virus_regexp {
        Some(pattern) => Some(regex::Regex::new(pattern).map_err(|e| {
            crate::error::CoreError::Scan(crate::error::ScanError::ExecFailed(format!(
                "invalid virus_regexp: {e}"
            )))
        })?),
        None => None,
    };
    Ok(ExternalScanner {
        command: config.command.clone(),
        args: config.args.clone(),
        virus_regexp,
        clean_codes: config.clean_codes.clone(),
        infected_codes: config.infected_codes.clone(),
        default_result: config.default_result,
    })
}
