//! Settlement networks the gate can charge on, and their address rules.
//!
//! Every [`Network`] belongs to exactly one [`AddressFamily`]. The family
//! decides what a syntactically valid address looks like and how payer
//! addresses and nonces are canonicalized before they key the nonce store.
//!
//! | Family    | Address form                     | Canonical form       |
//! |-----------|----------------------------------|----------------------|
//! | `eip155`  | `0x`-prefixed 20-byte hex        | lower-case hex       |
//! | `solana`  | base58, decoding to 32 bytes     | unchanged            |

use alloy_primitives::{Address, hex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address family (CAIP-2 namespace) a network belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Account-based EVM chains.
    Eip155,
    /// Ledger-based Solana clusters.
    Solana,
}

impl AddressFamily {
    /// CAIP-2 namespace string.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::Eip155 => "eip155",
            Self::Solana => "solana",
        }
    }

    /// Validates `address` and returns its canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAddress`] if the string is not a well-formed address
    /// for this family.
    pub fn canonical_address(self, address: &str) -> Result<String, InvalidAddress> {
        let invalid = |detail: &'static str| InvalidAddress {
            family: self,
            address: address.to_owned(),
            detail,
        };
        match self {
            Self::Eip155 => {
                if !address.starts_with("0x") {
                    return Err(invalid("missing 0x prefix"));
                }
                let parsed =
                    Address::from_str(address).map_err(|_| invalid("expected 20 hex bytes"))?;
                Ok(hex::encode_prefixed(parsed))
            }
            Self::Solana => {
                let bytes = bs58::decode(address)
                    .into_vec()
                    .map_err(|_| invalid("not base58"))?;
                if bytes.len() != 32 {
                    return Err(invalid("expected 32 bytes"));
                }
                Ok(address.to_owned())
            }
        }
    }

    /// Returns `true` if `address` is valid for this family.
    #[must_use]
    pub fn is_valid_address(self, address: &str) -> bool {
        self.canonical_address(address).is_ok()
    }

    /// Canonicalizes a nonce so that encodings the facilitator treats as equal
    /// also collide in the nonce store.
    ///
    /// On EIP-155 only `0x`-prefixed hex nonces are case-folded; any other
    /// nonce is kept verbatim, as on Solana.
    #[must_use]
    pub fn canonical_nonce(self, nonce: &str) -> String {
        let nonce = nonce.trim();
        match self {
            Self::Eip155 if is_prefixed_hex(nonce) => nonce.to_ascii_lowercase(),
            Self::Eip155 | Self::Solana => nonce.to_owned(),
        }
    }
}

fn is_prefixed_hex(s: &str) -> bool {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()))
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// An address that does not match its family's format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{address:?} is not a valid {family} address: {detail}")]
pub struct InvalidAddress {
    /// Family the address was checked against.
    pub family: AddressFamily,
    /// The rejected input.
    pub address: String,
    /// What was wrong with it.
    pub detail: &'static str,
}

/// A settlement network known to the gate.
///
/// Serialized with the x402 v1 network names (`"base-sepolia"`,
/// `"solana-devnet"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    /// Base mainnet.
    Base,
    /// Base Sepolia testnet.
    BaseSepolia,
    /// Avalanche C-Chain.
    Avalanche,
    /// Avalanche Fuji testnet.
    AvalancheFuji,
    /// Polygon `PoS` mainnet.
    Polygon,
    /// Polygon Amoy testnet.
    PolygonAmoy,
    /// Solana mainnet-beta.
    Solana,
    /// Solana devnet.
    SolanaDevnet,
}

impl Network {
    /// Every known network.
    pub const ALL: [Self; 8] = [
        Self::Base,
        Self::BaseSepolia,
        Self::Avalanche,
        Self::AvalancheFuji,
        Self::Polygon,
        Self::PolygonAmoy,
        Self::Solana,
        Self::SolanaDevnet,
    ];

    /// The x402 v1 network name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::BaseSepolia => "base-sepolia",
            Self::Avalanche => "avalanche",
            Self::AvalancheFuji => "avalanche-fuji",
            Self::Polygon => "polygon",
            Self::PolygonAmoy => "polygon-amoy",
            Self::Solana => "solana",
            Self::SolanaDevnet => "solana-devnet",
        }
    }

    /// Address family of this network.
    #[must_use]
    pub const fn family(self) -> AddressFamily {
        match self {
            Self::Solana | Self::SolanaDevnet => AddressFamily::Solana,
            _ => AddressFamily::Eip155,
        }
    }

    /// CAIP-2 chain reference.
    #[must_use]
    pub const fn reference(self) -> &'static str {
        match self {
            Self::Base => "8453",
            Self::BaseSepolia => "84532",
            Self::Avalanche => "43114",
            Self::AvalancheFuji => "43113",
            Self::Polygon => "137",
            Self::PolygonAmoy => "80002",
            Self::Solana => "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
            Self::SolanaDevnet => "EtWTRABZaYq6iMfeYKouRu166VU2xqa1",
        }
    }

    /// CAIP-2 identifier, e.g. `eip155:84532`.
    #[must_use]
    pub fn caip2(self) -> String {
        format!("{}:{}", self.family().namespace(), self.reference())
    }

    /// Circle USDC deployment on this network.
    #[must_use]
    pub const fn usdc(self) -> AssetDeployment {
        let address = match self {
            Self::Base => "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            Self::BaseSepolia => "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            Self::Avalanche => "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
            Self::AvalancheFuji => "0x5425890298aed601595a70AB815c96711a31Bc65",
            Self::Polygon => "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
            Self::PolygonAmoy => "0x41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF",
            Self::Solana => "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            Self::SolanaDevnet => "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
        };
        AssetDeployment {
            address,
            decimals: 6,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network name that is not in [`Network::ALL`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown network {0:?}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == s || n.caip2() == s)
            .ok_or_else(|| UnknownNetwork(s.to_owned()))
    }
}

/// A token contract (or mint) together with its decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetDeployment {
    /// Contract address (EVM) or mint address (Solana).
    pub address: &'static str,
    /// Number of decimals in the token's smallest unit.
    pub decimals: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVM_ADDR: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";
    const SOL_ADDR: &str = "So11111111111111111111111111111111111111112";

    #[test]
    fn evm_addresses_need_prefix_and_twenty_bytes() {
        let fam = AddressFamily::Eip155;
        assert!(fam.is_valid_address(EVM_ADDR));
        assert!(!fam.is_valid_address(&EVM_ADDR[2..]));
        assert!(!fam.is_valid_address("0x1234"));
        assert!(!fam.is_valid_address(SOL_ADDR));
    }

    #[test]
    fn evm_canonical_form_is_lowercase() {
        let canonical = AddressFamily::Eip155.canonical_address(EVM_ADDR).unwrap();
        assert_eq!(canonical, EVM_ADDR.to_ascii_lowercase());
    }

    #[test]
    fn only_hex_nonces_are_case_folded() {
        let evm = AddressFamily::Eip155;
        assert_eq!(evm.canonical_nonce(" 0xABcd "), "0xabcd");
        assert_eq!(evm.canonical_nonce("0XAB"), evm.canonical_nonce("0xab"));
        assert_eq!(evm.canonical_nonce("Ab"), "Ab");
        assert_ne!(evm.canonical_nonce("Ab"), evm.canonical_nonce("ab"));
        assert_eq!(evm.canonical_nonce("0xNotHex"), "0xNotHex");
        assert_eq!(evm.canonical_nonce("0x"), "0x");
        assert_eq!(AddressFamily::Solana.canonical_nonce("0xAB"), "0xAB");
    }

    #[test]
    fn solana_addresses_are_32_byte_base58() {
        let fam = AddressFamily::Solana;
        assert!(fam.is_valid_address(SOL_ADDR));
        assert!(!fam.is_valid_address(EVM_ADDR));
        assert!(!fam.is_valid_address("3xyz"));
        assert!(!fam.is_valid_address("0OIl"));
    }

    #[test]
    fn serde_names_match_wire_names() {
        for network in Network::ALL {
            let json = serde_json::to_string(&network).unwrap();
            assert_eq!(json, format!("\"{}\"", network.as_str()));
        }
    }

    #[test]
    fn parses_caip2_identifiers() {
        assert_eq!("eip155:84532".parse::<Network>().unwrap(), Network::BaseSepolia);
        assert!("eip155:1".parse::<Network>().is_err());
    }

    #[test]
    fn usdc_deployments_match_family() {
        for network in Network::ALL {
            assert!(network.family().is_valid_address(network.usdc().address));
        }
    }
}
