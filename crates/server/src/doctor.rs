//! Diagnostics for the mantis-mcp setup.
//!
//! Inspects the `MANTIS_*` environment, then probes the tracker's
//! current-user endpoint to confirm the base URL and API key actually work.

use anyhow::Result;
use mantis_client::soap::soap_endpoint;
use mantis_client::MantisGateway;
use mantis_state::MantisConfig;

/// Describes the configuration surface without echoing the API key.
fn config_lines(config: &MantisConfig) -> Vec<String> {
    let token = match &config.api_token {
        Some(token) => format!("set ({} chars)", token.len()),
        None => "not set (requests go out anonymously)".to_string(),
    };
    vec![
        format!("base URL:  {}", config.base_url),
        format!("SOAP URL:  {}", soap_endpoint(&config.base_url)),
        format!("API token: {token}"),
        format!(
            "cache:     {} (ttl {}s)",
            if config.cache_enabled {
                "enabled"
            } else {
                "disabled"
            },
            config.cache_ttl.as_secs()
        ),
    ]
}

/// One round-trip against `/users/me` to prove the tracker is reachable
/// and the key is accepted.
async fn connectivity_lines(gateway: &MantisGateway) -> Vec<String> {
    match gateway.get_current_user().await {
        Ok(user) => vec![format!(
            "tracker:   reachable, authenticated as {} (id {})",
            user.name, user.id
        )],
        Err(e) => vec![
            format!("! tracker probe failed: {e}"),
            "Hint: /users/me requires a valid key; check MANTIS_API_URL and MANTIS_API_TOKEN."
                .to_string(),
        ],
    }
}

async fn report_lines() -> Vec<String> {
    let mut lines = vec!["== mantis-mcp doctor ==".to_string()];
    match MantisConfig::from_env() {
        Ok(config) => {
            lines.extend(config_lines(&config));
            match MantisGateway::new(&config) {
                Ok(gateway) => lines.extend(connectivity_lines(&gateway).await),
                Err(e) => lines.push(format!("! failed to build the tracker client: {e}")),
            }
        }
        Err(e) => {
            lines.push(format!("! configuration error: {e}"));
            lines.push(
                "Hint: set MANTIS_API_URL to the tracker's REST base, e.g. https://tracker.example.com/api/rest"
                    .to_string(),
            );
        }
    }
    lines
}

/// Runs diagnostics on the tracker configuration and prints the report.
///
/// Problems are prefixed with `!`; the command itself succeeds either way
/// so the report always prints in full.
pub async fn doctor_report() -> Result<()> {
    for line in report_lines().await {
        println!("{line}");
    }
    Ok(())
}
