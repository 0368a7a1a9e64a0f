//! EVM escrow client.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::abi::{ParamType, Token};
use ethers::{
    prelude::*,
    types::{Address, Bytes, U256},
};
use std::sync::Arc;
use tracing::{debug, info};

use zkramp_common::{RawClaim, RawOrder};

use super::{EscrowReader, EscrowWriter, OnRampCall};

/// Signer-backed client for one escrow contract.
#[derive(Clone)]
pub struct EvmEscrowClient {
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    escrow_address: Address,
}

impl EvmEscrowClient {
    pub fn new(
        rpc_url: &str,
        escrow_address: &str,
        chain_id: u64,
        private_key: Option<String>,
    ) -> Result<Self> {
        let provider =
            Provider::<Http>::try_from(rpc_url).context("Failed to create HTTP provider")?;

        let wallet = if let Some(key) = private_key {
            key.parse::<LocalWallet>().context("Invalid private key")?
        } else {
            // Read-only setups run with a throwaway key.
            LocalWallet::new(&mut rand::thread_rng())
        };
        let wallet = wallet.with_chain_id(chain_id);

        let client = SignerMiddleware::new(provider, wallet);

        let escrow_address: Address = escrow_address
            .parse()
            .map_err(|err| anyhow!("Invalid escrow address: {err}"))?;

        Ok(Self {
            client: Arc::new(client),
            escrow_address,
        })
    }

    /// Address of the signing wallet.
    pub fn wallet_address(&self) -> String {
        format!("{:?}", self.client.signer().address())
    }

    pub async fn health_check(&self) -> Result<u64> {
        let block = self.client.get_block_number().await?;
        debug!("EVM health check: block {}", block);
        Ok(block.as_u64())
    }

    async fn read_call(&self, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let tx = TransactionRequest::new()
            .to(self.escrow_address)
            .data(Bytes::from(calldata));
        let raw = self
            .client
            .call(&tx.into(), None)
            .await
            .context("Escrow call reverted")?;
        Ok(raw.to_vec())
    }

    async fn send(&self, calldata: Vec<u8>) -> Result<String> {
        debug!("Sending transaction to escrow at {:?}", self.escrow_address);
        let tx = TransactionRequest::new()
            .to(self.escrow_address)
            .data(Bytes::from(calldata))
            .gas(500_000u64);

        let pending_tx = self.client.send_transaction(tx, None).await?;
        info!("Transaction submitted: {:?}", pending_tx.tx_hash());

        let receipt = pending_tx
            .await?
            .context("Transaction dropped from the mempool")?;
        Ok(format!("{:?}", receipt.transaction_hash))
    }
}

#[async_trait]
impl EscrowReader for EvmEscrowClient {
    async fn fetch_orders(&self) -> Result<Vec<RawOrder>> {
        let calldata = selector("getAllOrders()").to_vec();
        let raw = self.read_call(calldata).await?;
        let rows = decode_row_array(&raw, order_tuple(), "getAllOrders")?;
        rows.into_iter().map(decode_order_row).collect()
    }

    async fn fetch_claims(&self, order_id: u64) -> Result<Vec<RawClaim>> {
        let mut calldata = selector("getClaimsForOrder(uint256)").to_vec();
        calldata.extend_from_slice(&ethers::abi::encode(&[Token::Uint(U256::from(order_id))]));
        let raw = self.read_call(calldata).await?;
        let rows = decode_row_array(&raw, claim_tuple(), "getClaimsForOrder")?;
        rows.into_iter().map(decode_claim_row).collect()
    }
}

#[async_trait]
impl EscrowWriter for EvmEscrowClient {
    async fn post_order(
        &self,
        amount_to_receive: u64,
        max_amount_to_pay: u64,
        encrypt_public_key: &str,
    ) -> Result<String> {
        let mut calldata = selector("postOrder(uint256,uint256,string)").to_vec();
        calldata.extend_from_slice(&ethers::abi::encode(&[
            Token::Uint(U256::from(amount_to_receive)),
            Token::Uint(U256::from(max_amount_to_pay)),
            Token::String(encrypt_public_key.to_string()),
        ]));
        self.send(calldata).await
    }

    async fn claim_order(
        &self,
        order_id: u64,
        hashed_venmo_id: &str,
        encrypted_venmo_id: &[u8],
        min_amount_to_pay: u64,
    ) -> Result<String> {
        let commitment = U256::from_dec_str(hashed_venmo_id)
            .map_err(|err| anyhow!("Invalid venmo commitment: {err}"))?;
        let mut calldata = selector("claimOrder(uint256,uint256,bytes,uint256)").to_vec();
        calldata.extend_from_slice(&ethers::abi::encode(&[
            Token::Uint(U256::from(order_id)),
            Token::Uint(commitment),
            Token::Bytes(encrypted_venmo_id.to_vec()),
            Token::Uint(U256::from(min_amount_to_pay)),
        ]));
        self.send(calldata).await
    }

    async fn on_ramp(
        &self,
        order_id: u64,
        claim_id: u64,
        call: &OnRampCall,
    ) -> Result<String> {
        let calldata = encode_on_ramp(order_id, claim_id, call)?;
        self.send(calldata).await
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = ethers::utils::keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn order_tuple() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::String,
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(8),
    ])
}

fn claim_tuple() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::Uint(256),
        ParamType::Uint(8),
        ParamType::Bytes,
        ParamType::Uint(256),
        ParamType::Uint(256),
    ])
}

fn decode_row_array(raw: &[u8], tuple: ParamType, what: &str) -> Result<Vec<Token>> {
    let mut tokens = ethers::abi::decode(&[ParamType::Array(Box::new(tuple))], raw)
        .with_context(|| format!("Failed to decode {what} return data"))?;
    match tokens.pop() {
        Some(Token::Array(rows)) => Ok(rows),
        other => bail!("Unexpected {what} return shape: {other:?}"),
    }
}

fn decode_order_row(token: Token) -> Result<RawOrder> {
    let fields: [Token; 6] = match token {
        Token::Tuple(fields) => fields
            .try_into()
            .map_err(|fields: Vec<Token>| anyhow!("order row has {} fields", fields.len()))?,
        other => bail!("Unexpected order row shape: {other:?}"),
    };
    let [id, on_ramper, encrypt_public_key, amount_to_receive, max_amount_to_pay, status] = fields;
    Ok(RawOrder {
        order_id: uint_to_u64(&id, "order id")?,
        on_ramper: address_to_string(&on_ramper, "on-ramper")?,
        on_ramper_encrypt_public_key: string_token(encrypt_public_key, "encrypt public key")?,
        amount_to_receive: uint_to_u64(&amount_to_receive, "amount to receive")?,
        max_amount_to_pay: uint_to_u64(&max_amount_to_pay, "max amount to pay")?,
        status: uint_to_u8(&status, "order status")?,
    })
}

fn decode_claim_row(token: Token) -> Result<RawClaim> {
    let fields: [Token; 7] = match token {
        Token::Tuple(fields) => fields
            .try_into()
            .map_err(|fields: Vec<Token>| anyhow!("claim row has {} fields", fields.len()))?,
        other => bail!("Unexpected claim row shape: {other:?}"),
    };
    let [id, off_ramper, commitment, status, encrypted, expiration, min_amount] = fields;
    let hashed_venmo_id = match commitment {
        Token::Uint(value) => value.to_string(),
        other => bail!("Expected uint venmo commitment, got {other:?}"),
    };
    let encrypted_off_ramper_venmo_id = match encrypted {
        Token::Bytes(bytes) => bytes,
        other => bail!("Expected bytes encrypted venmo id, got {other:?}"),
    };
    Ok(RawClaim {
        claim_id: uint_to_u64(&id, "claim id")?,
        off_ramper: address_to_string(&off_ramper, "off-ramper")?,
        hashed_venmo_id,
        status: uint_to_u8(&status, "claim status")?,
        encrypted_off_ramper_venmo_id,
        claim_expiration_time: uint_to_u64(&expiration, "claim expiration")?,
        min_amount_to_pay: uint_to_u64(&min_amount, "min amount to pay")?,
    })
}

fn encode_on_ramp(order_id: u64, claim_id: u64, call: &OnRampCall) -> Result<Vec<u8>> {
    let pi_a = Token::FixedArray(vec![
        uint_from_dec(&call.pi_a[0], "pi_a[0]")?,
        uint_from_dec(&call.pi_a[1], "pi_a[1]")?,
    ]);
    let pi_b = Token::FixedArray(vec![
        Token::FixedArray(vec![
            uint_from_dec(&call.pi_b[0][0], "pi_b[0][0]")?,
            uint_from_dec(&call.pi_b[0][1], "pi_b[0][1]")?,
        ]),
        Token::FixedArray(vec![
            uint_from_dec(&call.pi_b[1][0], "pi_b[1][0]")?,
            uint_from_dec(&call.pi_b[1][1], "pi_b[1][1]")?,
        ]),
    ]);
    let pi_c = Token::FixedArray(vec![
        uint_from_dec(&call.pi_c[0], "pi_c[0]")?,
        uint_from_dec(&call.pi_c[1], "pi_c[1]")?,
    ]);
    let signals = call
        .public_signals
        .iter()
        .enumerate()
        .map(|(i, signal)| uint_from_dec(signal, "public signal").with_context(|| format!("signal {i}")))
        .collect::<Result<Vec<_>>>()?;

    let mut calldata =
        selector("onRamp(uint256,uint256,uint256[2],uint256[2][2],uint256[2],uint256[])").to_vec();
    calldata.extend_from_slice(&ethers::abi::encode(&[
        Token::Uint(U256::from(order_id)),
        Token::Uint(U256::from(claim_id)),
        pi_a,
        pi_b,
        pi_c,
        Token::Array(signals),
    ]));
    Ok(calldata)
}

fn uint_from_dec(value: &str, what: &str) -> Result<Token> {
    U256::from_dec_str(value)
        .map(Token::Uint)
        .map_err(|err| anyhow!("{what} is not a decimal field element: {err}"))
}

fn uint_to_u64(token: &Token, what: &str) -> Result<u64> {
    match token {
        Token::Uint(value) if *value <= U256::from(u64::MAX) => Ok(value.as_u64()),
        Token::Uint(_) => bail!("{what} exceeds the u64 range"),
        other => bail!("Expected uint for {what}, got {other:?}"),
    }
}

fn uint_to_u8(token: &Token, what: &str) -> Result<u8> {
    match token {
        Token::Uint(value) if *value <= U256::from(u8::MAX) => Ok(value.as_u64() as u8),
        Token::Uint(_) => bail!("{what} exceeds the u8 range"),
        other => bail!("Expected uint for {what}, got {other:?}"),
    }
}

fn address_to_string(token: &Token, what: &str) -> Result<String> {
    match token {
        Token::Address(addr) => Ok(format!("{addr:?}")),
        other => bail!("Expected address for {what}, got {other:?}"),
    }
}

fn string_token(token: Token, what: &str) -> Result<String> {
    match token {
        Token::String(value) => Ok(value),
        other => bail!("Expected string for {what}, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_row_token() -> Token {
        Token::Tuple(vec![
            Token::Uint(U256::from(7u64)),
            Token::Address("24506dc1918183960ac04db859eb293b115952af".parse().unwrap()),
            Token::String("0x04aabb".into()),
            Token::Uint(U256::from(100_000_000u64)),
            Token::Uint(U256::from(101_000_000u64)),
            Token::Uint(U256::from(1u64)),
        ])
    }

    #[test]
    fn order_row_decodes() {
        let row = decode_order_row(order_row_token()).unwrap();
        assert_eq!(row.order_id, 7);
        assert_eq!(row.on_ramper, "0x24506dc1918183960ac04db859eb293b115952af");
        assert_eq!(row.status, 1);
    }

    #[test]
    fn oversized_uint_is_rejected() {
        let mut fields = match order_row_token() {
            Token::Tuple(fields) => fields,
            _ => unreachable!(),
        };
        fields[3] = Token::Uint(U256::from(u64::MAX) + 1);
        assert!(decode_order_row(Token::Tuple(fields)).is_err());
    }

    #[test]
    fn claim_commitment_becomes_decimal_string() {
        let row = decode_claim_row(Token::Tuple(vec![
            Token::Uint(U256::from(3u64)),
            Token::Address("24506dc1918183960ac04db859eb293b115952af".parse().unwrap()),
            Token::Uint(U256::from_dec_str("18597249071228858579006477").unwrap()),
            Token::Uint(U256::from(1u64)),
            Token::Bytes(vec![0xde, 0xad]),
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::Uint(U256::from(99_000_000u64)),
        ]))
        .unwrap();
        assert_eq!(row.hashed_venmo_id, "18597249071228858579006477");
        assert_eq!(row.encrypted_off_ramper_venmo_id, vec![0xde, 0xad]);
    }

    #[test]
    fn row_array_round_trips_through_abi() {
        let encoded = ethers::abi::encode(&[Token::Array(vec![order_row_token()])]);
        let rows = decode_row_array(&encoded, order_tuple(), "getAllOrders").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(decode_order_row(rows.into_iter().next().unwrap()).is_ok());
    }

    #[test]
    fn on_ramp_calldata_has_selector_prefix() {
        let call = OnRampCall {
            pi_a: ["1".into(), "2".into()],
            pi_b: [["4".into(), "3".into()], ["6".into(), "5".into()]],
            pi_c: ["7".into(), "8".into()],
            public_signals: vec!["11".into(), "12".into(), "13".into()],
        };
        let calldata = encode_on_ramp(9, 3, &call).unwrap();
        let expected =
            selector("onRamp(uint256,uint256,uint256[2],uint256[2][2],uint256[2],uint256[])");
        assert_eq!(&calldata[..4], &expected);
        // selector + head words + dynamic signal array tail
        assert!(calldata.len() > 4 + 32 * 10);
    }

    #[test]
    fn non_decimal_proof_coordinate_is_rejected() {
        let call = OnRampCall {
            pi_a: ["0xdeadbeef".into(), "2".into()],
            pi_b: [["1".into(), "2".into()], ["3".into(), "4".into()]],
            pi_c: ["5".into(), "6".into()],
            public_signals: vec![],
        };
        assert!(encode_on_ramp(1, 1, &call).is_err());
    }
}
