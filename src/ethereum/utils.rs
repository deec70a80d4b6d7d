use alloy::primitives::{Address, B256, U256};
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(anyhow!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        ));
    }

    if address.len() != 42 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        ));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Validates a block or transaction hash (0x + 64 hex characters)
pub fn validate_hash(hash: &str) -> Result<B256> {
    let hash = hash.trim();

    let hex_part = hash
        .strip_prefix("0x")
        .or_else(|| hash.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("Invalid hash format: '{}'. Hashes must start with '0x'", hash))?;

    let bytes = hex::decode(hex_part)
        .map_err(|e| anyhow!("Invalid hash format: '{}'. {}", hash, e))?;

    if bytes.len() != 32 {
        return Err(anyhow!(
            "Invalid hash length: '{}'. Hashes must be 32 bytes (0x + 64 hex characters)",
            hash
        ));
    }

    Ok(B256::from_slice(&bytes))
}

/// Validates network name
pub fn validate_network(network: &str, available_networks: &[String]) -> Result<()> {
    if network.is_empty() {
        return Err(anyhow!("Network name cannot be empty"));
    }

    if !available_networks.contains(&network.to_string()) {
        return Err(anyhow!(
            "Unknown network: '{}'. Available networks: {}",
            network,
            available_networks.join(", ")
        ));
    }

    Ok(())
}

/// Decodes a `0x`-prefixed hex quantity as returned by the node.
pub fn parse_hex_quantity(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("Invalid hex quantity: '{}'", value))?;

    let quantity = U256::from_str_radix(digits, 16)
        .map_err(|_| anyhow!("Invalid hex quantity: '{}'", value))?;

    if quantity > U256::from(u64::MAX) {
        return Err(anyhow!("Hex quantity out of range: '{}'", value));
    }

    Ok(quantity.to::<u64>())
}

/// Encodes a block number as a JSON-RPC hex quantity.
pub fn to_hex_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("rate limit") || error.contains("429") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else if error.contains("method not found") || error.contains("-32601") {
        "RPC error: The requested method is not supported by this RPC endpoint. Trace queries need an archive node with the trace API enabled.".to_string()
    } else if error.contains("query returned more than") || error.contains("block range") {
        "RPC error: The node rejected the block range. Lower the scan window size or move the start block forward.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_ok());
        assert!(validate_address("0x0000000000000000000000000000000000000000").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("not_an_address").is_err());
        assert!(validate_address("0x123").is_err());
        assert!(validate_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
        assert!(validate_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
    }

    #[test]
    fn test_validate_hash() {
        let hash = "0xece30a9c28b4f78d2e4df1eb66cb2db0af6731ebad066aaabe4a81737fcd0f98";
        assert!(validate_hash(hash).is_ok());

        assert!(validate_hash("0xabc").is_err());
        assert!(validate_hash("ece30a9c28b4f78d2e4df1eb66cb2db0af6731ebad066aaabe4a81737fcd0f98").is_err());
        assert!(validate_hash("0xzz").is_err());
    }

    #[test]
    fn test_validate_network() {
        let networks = vec!["ethereum".to_string(), "base_sepolia".to_string()];

        assert!(validate_network("ethereum", &networks).is_ok());
        assert!(validate_network("base_sepolia", &networks).is_ok());
        assert!(validate_network("invalid", &networks).is_err());
        assert!(validate_network("", &networks).is_err());
    }

    #[test]
    fn test_hex_quantities() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_hex_quantity("0xE1C2C7").unwrap(), 14_795_463);
        assert!(parse_hex_quantity("26").is_err());
        assert!(parse_hex_quantity("0xnothex").is_err());
        assert!(parse_hex_quantity("0x10000000000000000").is_err());

        assert_eq!(to_hex_quantity(16_856_925), "0x101375d");
    }
}
