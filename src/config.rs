// nexus_gateway/src/config.rs
//
// CLI configuration, replacing the reference implementation's `argv`
// parsing. `buyLimit`/`sellLimit` default to 100/100 when omitted, the
// way the original prints a usage line and falls back rather than
// refusing to start.

use crate::risk::RiskLimits;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "nexus-gatewayd", about = "Pre-trade risk gateway")]
pub struct Cli {
    /// Maximum hypothetical buy-side exposure per listing.
    #[arg(long, default_value_t = RiskLimits::default().buy_limit)]
    pub buy_limit: u64,

    /// Maximum hypothetical sell-side exposure per listing.
    #[arg(long, default_value_t = RiskLimits::default().sell_limit)]
    pub sell_limit: u64,

    /// Bind address. Not configurable in the reference implementation,
    /// which is hardcoded to 127.0.0.1:4000.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port.
    #[arg(long, default_value_t = 4000)]
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub risk_limits: RiskLimits,
    pub host: String,
    pub port: u16,
}

impl From<Cli> for GatewayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            risk_limits: RiskLimits {
                buy_limit: cli.buy_limit,
                sell_limit: cli.sell_limit,
            },
            host: cli.host,
            port: cli.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_match_reference_implementation() {
        let cli = Cli::try_parse_from(["nexus-gatewayd"]).unwrap();
        assert_eq!(cli.buy_limit, 100);
        assert_eq!(cli.sell_limit, 100);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 4000);
    }

    #[test]
    fn test_explicit_limits_override_defaults() {
        let cli = Cli::try_parse_from([
            "nexus-gatewayd",
            "--buy-limit",
            "500",
            "--sell-limit",
            "250",
        ])
        .unwrap();
        let config = GatewayConfig::from(cli);
        assert_eq!(config.risk_limits.buy_limit, 500);
        assert_eq!(config.risk_limits.sell_limit, 250);
    }
}
