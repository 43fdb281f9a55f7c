//! ABI calldata for the handful of contract entry points the client touches.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use thiserror::Error;

pub const APPROVE: &str = "approve(address,uint256)";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const DECIMALS: &str = "decimals()";
pub const TOTAL_SUPPLY: &str = "totalSupply()";

/// Entry point of the deployed issuance contract.
pub const DEFAULT_PURCHASE_SIGNATURE: &str = "buyATTWithUSDC(uint256)";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Purchase signature must take a single uint256: {0}")]
    BadSignature(String),

    #[error("Malformed return data: {0}")]
    MalformedReturn(String),
}

fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(args));
    data.into()
}

pub fn approve(spender: Address, amount: U256) -> Bytes {
    encode_call(APPROVE, &[Token::Address(spender), Token::Uint(amount)])
}

pub fn balance_of(holder: Address) -> Bytes {
    encode_call(BALANCE_OF, &[Token::Address(holder)])
}

pub fn decimals() -> Bytes {
    encode_call(DECIMALS, &[])
}

pub fn total_supply() -> Bytes {
    encode_call(TOTAL_SUPPLY, &[])
}

/// Check that a configured purchase signature has the `name(uint256)` shape.
pub fn validate_purchase_signature(signature: &str) -> Result<(), ContractError> {
    let name = signature
        .strip_suffix("(uint256)")
        .ok_or_else(|| ContractError::BadSignature(signature.to_string()))?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ContractError::BadSignature(signature.to_string()));
    }
    Ok(())
}

pub fn purchase(signature: &str, amount: U256) -> Result<Bytes, ContractError> {
    validate_purchase_signature(signature)?;
    Ok(encode_call(signature, &[Token::Uint(amount)]))
}

/// Decode a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256, ContractError> {
    let mut tokens = abi::decode(&[ParamType::Uint(256)], data)
        .map_err(|e| ContractError::MalformedReturn(e.to_string()))?;
    tokens
        .pop()
        .and_then(Token::into_uint)
        .ok_or_else(|| ContractError::MalformedReturn("expected uint256".to_string()))
}

/// Decode a `decimals()` return value, which must fit in a `u8`.
pub fn decode_decimals(data: &[u8]) -> Result<u8, ContractError> {
    let raw = decode_uint(data)?;
    if raw > U256::from(u8::MAX) {
        return Err(ContractError::MalformedReturn(format!(
            "decimals out of range: {raw}"
        )));
    }
    Ok(raw.as_u32() as u8)
}

/// A decoded outgoing call, as seen by whoever receives the calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCall {
    Approve { spender: Address, amount: U256 },
    BalanceOf(Address),
    Decimals,
    TotalSupply,
    Purchase(U256),
    Unknown,
}

pub fn decode_call(data: &[u8], purchase_signature: &str) -> DecodedCall {
    if data.len() < 4 {
        return DecodedCall::Unknown;
    }
    let (selector, args) = data.split_at(4);
    if selector == id(APPROVE).as_slice() {
        if let Ok(tokens) = abi::decode(&[ParamType::Address, ParamType::Uint(256)], args) {
            if let [Token::Address(spender), Token::Uint(amount)] = tokens.as_slice() {
                return DecodedCall::Approve {
                    spender: *spender,
                    amount: *amount,
                };
            }
        }
    } else if selector == id(BALANCE_OF).as_slice() {
        if let Ok(tokens) = abi::decode(&[ParamType::Address], args) {
            if let [Token::Address(holder)] = tokens.as_slice() {
                return DecodedCall::BalanceOf(*holder);
            }
        }
    } else if selector == id(DECIMALS).as_slice() {
        return DecodedCall::Decimals;
    } else if selector == id(TOTAL_SUPPLY).as_slice() {
        return DecodedCall::TotalSupply;
    } else if selector == id(purchase_signature).as_slice() {
        if let Ok(amount) = decode_uint(args) {
            return DecodedCall::Purchase(amount);
        }
    }
    DecodedCall::Unknown
}
