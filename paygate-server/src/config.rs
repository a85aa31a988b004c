//! Server configuration.
//!
//! Every setting can be given as a command line flag or an environment
//! variable. A `.env` file in the working directory is loaded first, so its
//! values act as defaults for unset variables.
//!
//! # Environment Variables
//!
//! - `PAYGATE_HOST` - Bind address (default: `0.0.0.0`)
//! - `PAYGATE_PORT` - Port (default: `4021`)
//! - `PAYGATE_BASE_URL` - Public origin used in challenge `resource` URLs
//! - `EVM_PAY_TO` - Payee of the EIP-155 routes (required)
//! - `EVM_FACILITATOR_URL` - Facilitator settling the EIP-155 routes (required)
//! - `EVM_NETWORK` - EIP-155 network (default: `base-sepolia`)
//! - `SOLANA_PAY_TO` - Payee of the Solana routes (required)
//! - `SOLANA_FACILITATOR_URL` - Facilitator settling the Solana routes (required)
//! - `SOLANA_NETWORK` - Solana network (default: `solana-devnet`)
//! - `FACILITATOR_API_KEY` - Bearer token sent to both facilitators
//! - `PAYGATE_NONCE_SWEEP_SECONDS` - Expired-nonce sweep interval (default: `60`)
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use paygate::ConfigurationError;
use paygate::networks::{AddressFamily, Network};
use url::Url;

/// Raw command line and environment settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "paygate-server", version, about = "Sells API calls for x402 payments")]
pub struct Cli {
    /// Bind address.
    #[arg(long, env = "PAYGATE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port.
    #[arg(long, env = "PAYGATE_PORT", default_value_t = 4021)]
    pub port: u16,

    /// Public origin of this server, e.g. `https://api.example.com`.
    #[arg(long, env = "PAYGATE_BASE_URL")]
    pub base_url: Option<String>,

    /// Payee address of the EIP-155 routes.
    #[arg(long, env = "EVM_PAY_TO")]
    pub evm_pay_to: Option<String>,

    /// Facilitator settling the EIP-155 routes.
    #[arg(long, env = "EVM_FACILITATOR_URL")]
    pub evm_facilitator_url: Option<String>,

    /// EIP-155 network the EVM routes charge on.
    #[arg(long, env = "EVM_NETWORK", default_value = "base-sepolia")]
    pub evm_network: Network,

    /// Payee address of the Solana routes.
    #[arg(long, env = "SOLANA_PAY_TO")]
    pub solana_pay_to: Option<String>,

    /// Facilitator settling the Solana routes.
    #[arg(long, env = "SOLANA_FACILITATOR_URL")]
    pub solana_facilitator_url: Option<String>,

    /// Solana network the Solana routes charge on.
    #[arg(long, env = "SOLANA_NETWORK", default_value = "solana-devnet")]
    pub solana_network: Network,

    /// Bearer token sent to the facilitators.
    #[arg(long, env = "FACILITATOR_API_KEY", hide_env_values = true)]
    pub facilitator_api_key: Option<String>,

    /// Seconds between sweeps of expired nonces.
    #[arg(long, env = "PAYGATE_NONCE_SWEEP_SECONDS", default_value_t = 60)]
    pub nonce_sweep_seconds: u64,
}

/// One settlement rail: a network, who gets paid on it and who settles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RailConfig {
    /// Network every route of the rail charges on.
    pub network: Network,
    /// Payee address, validated for the network's family.
    pub pay_to: String,
    /// Facilitator base URL.
    pub facilitator_url: Url,
}

/// Validated, immutable server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket to listen on.
    pub addr: SocketAddr,
    /// Public origin used in challenges.
    pub base_url: Option<Url>,
    /// The EIP-155 rail.
    pub evm: RailConfig,
    /// The Solana rail.
    pub solana: RailConfig,
    /// Bearer token for the facilitators.
    pub facilitator_api_key: Option<String>,
    /// Interval of the expired-nonce sweeper.
    pub nonce_sweep_interval: Duration,
}

impl ServerConfig {
    /// Loads `.env`, parses flags and environment, and validates them.
    ///
    /// Exits the process with a usage message if a flag cannot be parsed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if a required setting is missing or invalid.
    pub fn load() -> Result<Self, ConfigurationError> {
        let _ = dotenvy::dotenv();
        Self::from_cli(Cli::parse())
    }

    /// Validates already parsed settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if a required setting is missing, a URL
    /// does not parse, or a payee is not an address of its rail's family.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigurationError> {
        let base_url = cli
            .base_url
            .as_deref()
            .map(|raw| parse_url("PAYGATE_BASE_URL", raw))
            .transpose()?;
        let evm = rail(
            AddressFamily::Eip155,
            cli.evm_network,
            cli.evm_pay_to,
            cli.evm_facilitator_url,
            ("EVM_PAY_TO", "EVM_FACILITATOR_URL"),
        )?;
        let solana = rail(
            AddressFamily::Solana,
            cli.solana_network,
            cli.solana_pay_to,
            cli.solana_facilitator_url,
            ("SOLANA_PAY_TO", "SOLANA_FACILITATOR_URL"),
        )?;
        if cli.nonce_sweep_seconds == 0 {
            return Err(ConfigurationError::InvalidSetting {
                name: "PAYGATE_NONCE_SWEEP_SECONDS",
                detail: "sweep interval must be positive",
            });
        }
        Ok(Self {
            addr: SocketAddr::new(cli.host, cli.port),
            base_url,
            evm,
            solana,
            facilitator_api_key: cli.facilitator_api_key.filter(|key| !key.trim().is_empty()),
            nonce_sweep_interval: Duration::from_secs(cli.nonce_sweep_seconds),
        })
    }
}

fn rail(
    family: AddressFamily,
    network: Network,
    pay_to: Option<String>,
    facilitator_url: Option<String>,
    (pay_to_name, url_name): (&'static str, &'static str),
) -> Result<RailConfig, ConfigurationError> {
    let pay_to = required(pay_to, pay_to_name)?;
    let facilitator_url = parse_url(url_name, &required(facilitator_url, url_name)?)?;
    if network.family() != family {
        let (name, detail) = match family {
            AddressFamily::Eip155 => ("EVM_NETWORK", "must be an EIP-155 network"),
            AddressFamily::Solana => ("SOLANA_NETWORK", "must be a Solana network"),
        };
        return Err(ConfigurationError::InvalidSetting { name, detail });
    }
    let pay_to = family
        .canonical_address(pay_to.trim())
        .map_err(|source| ConfigurationError::InvalidPayTo {
            route: pay_to_name.to_owned(),
            source,
        })?;
    Ok(RailConfig {
        network,
        pay_to,
        facilitator_url,
    })
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigurationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigurationError::Missing(name))
}

fn parse_url(name: &str, raw: &str) -> Result<Url, ConfigurationError> {
    Url::parse(raw.trim()).map_err(|source| ConfigurationError::InvalidUrl {
        name: name.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVM: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";
    const SOL: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

    fn cli(extra: &[&str]) -> Cli {
        let mut args = vec![
            "paygate-server",
            "--evm-pay-to",
            EVM,
            "--evm-facilitator-url",
            "https://evm.facilitator.example",
            "--solana-pay-to",
            SOL,
            "--solana-facilitator-url",
            "https://sol.facilitator.example",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let config = ServerConfig::from_cli(cli(&[])).unwrap();
        assert_eq!(config.addr.port(), 4021);
        assert_eq!(config.evm.network, Network::BaseSepolia);
        assert_eq!(config.solana.network, Network::SolanaDevnet);
        assert_eq!(config.nonce_sweep_interval, Duration::from_secs(60));
        assert!(config.base_url.is_none());
    }

    #[test]
    fn evm_payee_is_canonicalized() {
        let config = ServerConfig::from_cli(cli(&[])).unwrap();
        assert_eq!(config.evm.pay_to, EVM.to_ascii_lowercase());
        assert_eq!(config.solana.pay_to, SOL);
    }

    #[test]
    fn missing_payee_is_reported_by_name() {
        let mut parsed = cli(&[]);
        parsed.solana_pay_to = None;
        let err = ServerConfig::from_cli(parsed).unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing("SOLANA_PAY_TO")));
    }

    #[test]
    fn blank_facilitator_url_counts_as_missing() {
        let mut parsed = cli(&[]);
        parsed.evm_facilitator_url = Some("  ".into());
        let err = ServerConfig::from_cli(parsed).unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing("EVM_FACILITATOR_URL")));
    }

    #[test]
    fn payee_must_match_the_rail_family() {
        let mut parsed = cli(&[]);
        parsed.evm_pay_to = Some(SOL.into());
        let err = ServerConfig::from_cli(parsed).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPayTo { .. }));
    }

    #[test]
    fn network_must_match_the_rail_family() {
        let err = ServerConfig::from_cli(cli(&["--evm-network", "solana"])).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidSetting { name: "EVM_NETWORK", .. }
        ));
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let err =
            ServerConfig::from_cli(cli(&["--nonce-sweep-seconds", "0"])).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidSetting {
                name: "PAYGATE_NONCE_SWEEP_SECONDS",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "invalid setting PAYGATE_NONCE_SWEEP_SECONDS: sweep interval must be positive"
        );
    }

    #[test]
    fn unknown_network_is_a_usage_error() {
        let parsed = Cli::try_parse_from(["paygate-server", "--evm-network", "dogechain"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn base_url_must_parse() {
        let err = ServerConfig::from_cli(cli(&["--base-url", "not a url"])).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidUrl { .. }));
        let config =
            ServerConfig::from_cli(cli(&["--base-url", "https://api.example.com"])).unwrap();
        assert_eq!(config.base_url.unwrap().as_str(), "https://api.example.com/");
    }
}
