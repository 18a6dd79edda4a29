use crate::error::{Error, Result};

pub const MAX_WALLET_NAME_LEN: usize = 64;

pub fn validate_wallet_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::ValidationError("Wallet name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_WALLET_NAME_LEN {
        return Err(Error::ValidationError(format!(
            "Wallet name is longer than {} characters",
            MAX_WALLET_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::ValidationError(
            "Wallet name cannot contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Checks that `address` is a base58 encoded 32 byte public key.
pub fn validate_address(address: &str) -> Result<()> {
    if address.len() < 32 || address.len() > 44 {
        return Err(Error::ValidationError(format!(
            "Address must be 32 to 44 characters, got {}",
            address.len()
        )));
    }
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| Error::ValidationError(format!("Address is not valid base58: {}", e)))?;
    if bytes.len() != 32 {
        return Err(Error::ValidationError(format!(
            "Address decodes to {} bytes, expected 32",
            bytes.len()
        )));
    }
    Ok(())
}

/// Parses `name:address` as given on the command line.
pub fn parse_wallet_input(input: &str) -> Result<(String, String)> {
    let mut parts = input.split(':');
    let (name, address) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(address), None) => (name, address),
        _ => {
            return Err(Error::ValidationError(format!(
                "Expected NAME:ADDRESS, got '{}'",
                input
            )))
        }
    };
    let name = name.trim();
    let address = address.trim();
    validate_wallet_name(name)?;
    validate_address(address)?;
    Ok((name.to_string(), address.to_string()))
}
