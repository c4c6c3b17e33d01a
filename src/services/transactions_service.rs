//! Cliente de transacciones on-chain
//!
//! Facilidad opaca que produce typed-data firmable y ejecuta user-operations
//! firmadas contra el bundler (account abstraction). Mantiene estado de nonce
//! que no es seguro para uso concurrente: todas las submissions pasan por el
//! mutex interno, que se sostiene hasta recibir el resultado.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::config::environment::EnvironmentConfig;
use crate::utils::eip712::{keccak256, TypedData, TypedDataField};
use crate::utils::errors::{AppError, AppResult};

/// Transfer(address,address,uint256)
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// User-operation firmable, opaca para el resto del sistema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: String,
    pub nonce: String,
    pub call_data: String,
    #[serde(default)]
    pub call_gas_limit: String,
    #[serde(default)]
    pub verification_gas_limit: String,
    #[serde(default)]
    pub pre_verification_gas: String,
    #[serde(default)]
    pub max_fee_per_gas: String,
    #[serde(default)]
    pub max_priority_fee_per_gas: String,
    #[serde(default)]
    pub paymaster_and_data: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct MintResult {
    pub vehicle_token_id: Option<i64>,
    pub synthetic_token_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeInfoPair {
    pub attribute: String,
    pub info: String,
}

#[derive(Debug, Clone)]
pub struct MintVehicleAndSdInput {
    pub owner: String,
    pub vehicle_owner_sig: String,
    pub manufacturer_node: u64,
    pub integration_node: String,
    pub device_definition_id: String,
    pub synthetic_device_addr: String,
    pub synthetic_device_sig: String,
    pub attr_info_pairs_vehicle: Vec<AttributeInfoPair>,
}

#[derive(Debug, Clone)]
pub struct MintSdInput {
    pub vehicle_owner_sig: String,
    pub synthetic_device_addr: String,
    pub synthetic_device_sig: String,
    pub integration_node: String,
    pub vehicle_node: i64,
}

#[derive(Debug, Clone)]
pub struct SacdInput {
    pub grantee: String,
    pub permissions: i64,
    pub expiration: i64,
    pub source: String,
}

#[derive(Serialize)]
struct JsonRpcRequest<P: Serialize> {
    jsonrpc: &'static str,
    id: u32,
    method: &'static str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug)]
struct UserOperationReceipt {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    receipt: TransactionReceipt,
}

#[derive(Deserialize, Debug, Default)]
struct TransactionReceipt {
    #[serde(default)]
    logs: Vec<LogEntry>,
}

#[derive(Deserialize, Debug)]
struct LogEntry {
    #[serde(default)]
    address: String,
    #[serde(default)]
    topics: Vec<String>,
}

pub struct TransactionsClient {
    chain_id: i64,
    registry_address: String,
    vehicle_nft_address: String,
    synthetic_nft_address: String,
    developer_wallet: String,
    bundler_url: String,
    client: Client,
    /// Serializa cada submit: el nonce de la cuenta no tolera concurrencia
    submit_lock: Mutex<u64>,
}

impl TransactionsClient {
    /// Valida la configuración de chain; cualquier faltante es fatal.
    pub fn new(config: &EnvironmentConfig) -> AppResult<Self> {
        if config.rpc_url.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing RPC URL".to_string(),
            ));
        }
        if config.paymaster_url.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing Paymaster URL".to_string(),
            ));
        }
        if config.bundler_url.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing Bundler URL".to_string(),
            ));
        }
        if config.registry_address.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing Registry address".to_string(),
            ));
        }
        if config.vehicle_nft_address.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing Vehicle NFT address".to_string(),
            ));
        }
        if config.synthetic_nft_address.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing Synthetic NFT address".to_string(),
            ));
        }
        if config.chain_id == 0 {
            return Err(AppError::Internal(
                "invalid configuration: missing ChainID".to_string(),
            ));
        }
        if config.developer_aa_wallet_address.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing Developer AA wallet address".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            chain_id: config.chain_id,
            registry_address: config.registry_address.clone(),
            vehicle_nft_address: config.vehicle_nft_address.clone(),
            synthetic_nft_address: config.synthetic_nft_address.clone(),
            developer_wallet: config.developer_aa_wallet_address.clone(),
            bundler_url: config.bundler_url.clone(),
            client,
            submit_lock: Mutex::new(0),
        })
    }

    fn domain(&self) -> serde_json::Map<String, Value> {
        let mut domain = serde_json::Map::new();
        domain.insert("name".to_string(), json!("DIMO"));
        domain.insert("version".to_string(), json!("1"));
        domain.insert("chainId".to_string(), json!(self.chain_id));
        domain.insert(
            "verifyingContract".to_string(),
            json!(self.registry_address),
        );
        domain
    }

    fn typed_data(
        &self,
        primary_type: &str,
        fields: Vec<TypedDataField>,
        message: serde_json::Map<String, Value>,
    ) -> TypedData {
        let mut types = BTreeMap::new();
        types.insert(
            "EIP712Domain".to_string(),
            vec![
                field("name", "string"),
                field("version", "string"),
                field("chainId", "uint256"),
                field("verifyingContract", "address"),
            ],
        );
        types.insert(primary_type.to_string(), fields);

        TypedData {
            types,
            primary_type: primary_type.to_string(),
            domain: self.domain(),
            message,
        }
    }

    /// Typed-data que firma el dueño para mintear un vehículo con device definition
    pub fn get_mint_vehicle_with_dd_typed_data(
        &self,
        manufacturer_node: u64,
        owner: &str,
        device_definition_id: &str,
        attributes: &[AttributeInfoPair],
    ) -> TypedData {
        let mut message = serde_json::Map::new();
        message.insert("manufacturerNode".to_string(), json!(manufacturer_node));
        message.insert("owner".to_string(), json!(owner));
        message.insert(
            "deviceDefinitionId".to_string(),
            json!(device_definition_id),
        );
        message.insert(
            "attributes".to_string(),
            json!(attributes.iter().map(|a| a.attribute.clone()).collect::<Vec<_>>()),
        );
        message.insert(
            "infos".to_string(),
            json!(attributes.iter().map(|a| a.info.clone()).collect::<Vec<_>>()),
        );

        self.typed_data(
            "MintVehicleWithDeviceDefinitionSign",
            vec![
                field("manufacturerNode", "uint256"),
                field("owner", "address"),
                field("deviceDefinitionId", "string"),
                field("attributes", "string[]"),
                field("infos", "string[]"),
            ],
            message,
        )
    }

    /// Typed-data que firma la wallet SD al mintear vehículo + SD (integration node)
    pub fn get_mint_vehicle_and_sd_typed_data(&self, integration_node: &str) -> TypedData {
        let mut message = serde_json::Map::new();
        message.insert("integrationNode".to_string(), json!(integration_node));

        self.typed_data(
            "MintVehicleAndSdSign",
            vec![field("integrationNode", "uint256")],
            message,
        )
    }

    /// Variante V2: el mint va atado a un connection token en vez de una integración
    pub fn get_mint_vehicle_and_sd_typed_data_v2(&self, connection_token_id: &str) -> TypedData {
        let mut message = serde_json::Map::new();
        message.insert("connectionTokenId".to_string(), json!(connection_token_id));

        self.typed_data(
            "MintVehicleAndSdSign",
            vec![field("connectionTokenId", "uint256")],
            message,
        )
    }

    /// Typed-data que firma la wallet SD al mintear solo el SD
    pub fn get_mint_sd_typed_data(&self, integration_node: &str, vehicle_node: i64) -> TypedData {
        let mut message = serde_json::Map::new();
        message.insert("integrationNode".to_string(), json!(integration_node));
        message.insert("vehicleNode".to_string(), json!(vehicle_node));

        self.typed_data(
            "MintSyntheticDeviceSign",
            vec![
                field("integrationNode", "uint256"),
                field("vehicleNode", "uint256"),
            ],
            message,
        )
    }

    pub fn get_mint_sd_typed_data_v2(
        &self,
        connection_token_id: &str,
        vehicle_node: i64,
    ) -> TypedData {
        let mut message = serde_json::Map::new();
        message.insert("connectionTokenId".to_string(), json!(connection_token_id));
        message.insert("vehicleNode".to_string(), json!(vehicle_node));

        self.typed_data(
            "MintSyntheticDeviceSign",
            vec![
                field("connectionTokenId", "uint256"),
                field("vehicleNode", "uint256"),
            ],
            message,
        )
    }

    /// User-operation de burn del SD, lista para que el dueño firme el hash
    pub fn get_burn_sd_by_owner_user_operation_and_hash(
        &self,
        owner: &str,
        synthetic_token_id: i64,
    ) -> AppResult<(UserOperation, String)> {
        let call_data = encode_call(
            "burnSyntheticDeviceSign(uint256)",
            &[abi_uint(synthetic_token_id as u128)],
        );
        self.build_user_operation(owner, call_data)
    }

    /// User-operation de burn del vehículo
    pub fn get_burn_vehicle_by_owner_user_operation_and_hash(
        &self,
        owner: &str,
        vehicle_token_id: i64,
    ) -> AppResult<(UserOperation, String)> {
        let call_data = encode_call(
            "burnVehicleSign(uint256)",
            &[abi_uint(vehicle_token_id as u128)],
        );
        self.build_user_operation(owner, call_data)
    }

    fn build_user_operation(
        &self,
        sender: &str,
        call_data: Vec<u8>,
    ) -> AppResult<(UserOperation, String)> {
        let op = UserOperation {
            sender: sender.to_string(),
            nonce: "0x0".to_string(),
            call_data: format!("0x{}", hex::encode(&call_data)),
            call_gas_limit: String::new(),
            verification_gas_limit: String::new(),
            pre_verification_gas: String::new(),
            max_fee_per_gas: String::new(),
            max_priority_fee_per_gas: String::new(),
            paymaster_and_data: String::new(),
            signature: String::new(),
        };

        let hash = self.user_operation_hash(&op)?;
        Ok((op, hash))
    }

    /// Hash que firma el dueño: keccak(sender ‖ nonce ‖ keccak(callData) ‖ chainId)
    fn user_operation_hash(&self, op: &UserOperation) -> AppResult<String> {
        let sender = hex::decode(op.sender.trim_start_matches("0x"))
            .map_err(|e| AppError::Crypto(format!("invalid sender address: {}", e)))?;
        let call_data = hex::decode(op.call_data.trim_start_matches("0x"))
            .map_err(|e| AppError::Crypto(format!("invalid call data: {}", e)))?;

        let mut buffer = Vec::new();
        buffer.extend_from_slice(&sender);
        buffer.extend_from_slice(op.nonce.as_bytes());
        buffer.extend_from_slice(&keccak256(&call_data));
        buffer.extend_from_slice(&self.chain_id.to_be_bytes());

        Ok(format!("0x{}", hex::encode(keccak256(&buffer))))
    }

    /// Mint de vehículo + SD en una transacción, con SACD opcional
    pub async fn mint_vehicle_and_sd(
        &self,
        input: &MintVehicleAndSdInput,
        sacd: Option<&SacdInput>,
    ) -> AppResult<MintResult> {
        let attributes: Vec<String> = input
            .attr_info_pairs_vehicle
            .iter()
            .map(|pair| pair.attribute.clone())
            .collect();
        let infos: Vec<String> = input
            .attr_info_pairs_vehicle
            .iter()
            .map(|pair| pair.info.clone())
            .collect();

        let mut tokens = vec![
            abi_address(&input.owner)?,
            abi_dynamic_bytes(&decode_hex(&input.vehicle_owner_sig)?),
            abi_uint(input.manufacturer_node as u128),
            abi_uint_str(&input.integration_node)?,
            abi_dynamic_string(&input.device_definition_id),
            abi_address(&input.synthetic_device_addr)?,
            abi_dynamic_bytes(&decode_hex(&input.synthetic_device_sig)?),
            abi_string_array(&attributes),
            abi_string_array(&infos),
        ];

        let signature = if let Some(sacd) = sacd {
            tokens.push(abi_address(&sacd.grantee)?);
            tokens.push(abi_uint(sacd.permissions as u128));
            tokens.push(abi_uint(sacd.expiration as u128));
            "mintVehicleAndSdWithDeviceDefinitionSignAndSacd"
        } else {
            "mintVehicleAndSdWithDeviceDefinitionSign"
        };

        let call_data = encode_call(signature, &tokens);
        let receipt = self.submit(call_data).await?;

        Ok(self.parse_mint_result(&receipt))
    }

    /// Mint solo del SD, atado a un vehículo ya minteado
    pub async fn mint_sd(&self, input: &MintSdInput) -> AppResult<MintResult> {
        let tokens = vec![
            abi_uint_str(&input.integration_node)?,
            abi_uint(input.vehicle_node as u128),
            abi_address(&input.synthetic_device_addr)?,
            abi_dynamic_bytes(&decode_hex(&input.synthetic_device_sig)?),
            abi_dynamic_bytes(&decode_hex(&input.vehicle_owner_sig)?),
        ];

        let call_data = encode_call("mintSyntheticDeviceSign", &tokens);
        let receipt = self.submit(call_data).await?;

        Ok(self.parse_mint_result(&receipt))
    }

    /// Ejecuta una user-operation ya firmada por el cliente y espera el resultado
    pub async fn send_signed_user_operation(&self, op: &UserOperation) -> AppResult<MintResult> {
        if op.signature.is_empty() {
            return Err(AppError::BadRequest(
                "user operation is not signed".to_string(),
            ));
        }

        let _guard = self.submit_lock.lock().await;
        let receipt = self.send_and_wait(serde_json::to_value(op)?).await?;
        Ok(self.parse_mint_result(&receipt))
    }

    async fn submit(&self, call_data: Vec<u8>) -> AppResult<UserOperationReceipt> {
        let mut nonce = self.submit_lock.lock().await;

        let op = UserOperation {
            sender: self.developer_wallet.clone(),
            nonce: format!("0x{:x}", *nonce),
            call_data: format!("0x{}", hex::encode(&call_data)),
            call_gas_limit: String::new(),
            verification_gas_limit: String::new(),
            pre_verification_gas: String::new(),
            max_fee_per_gas: String::new(),
            max_priority_fee_per_gas: String::new(),
            paymaster_and_data: String::new(),
            signature: String::new(),
        };

        let receipt = self.send_and_wait(serde_json::to_value(&op)?).await?;
        *nonce += 1;

        Ok(receipt)
    }

    async fn send_and_wait(&self, op: Value) -> AppResult<UserOperationReceipt> {
        let hash = self
            .rpc_call::<String>("eth_sendUserOperation", json!([op, self.registry_address]))
            .await?
            .ok_or_else(|| AppError::ExternalApi("empty RPC result".to_string()))?;

        debug!("User operation enviada: {}", hash);

        // El bundler incluye la operación de forma asíncrona; result null
        // significa "todavía no incluida"
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_secs(3)).await;

            let receipt = self
                .rpc_call::<UserOperationReceipt>("eth_getUserOperationReceipt", json!([hash]))
                .await?;

            if let Some(receipt) = receipt {
                if !receipt.success {
                    return Err(AppError::ExternalApi(format!(
                        "user operation {} reverted",
                        hash
                    )));
                }
                return Ok(receipt);
            }
        }

        Err(AppError::ExternalApi(format!(
            "user operation {} not included in time",
            hash
        )))
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> AppResult<Option<T>> {
        let response = self
            .client
            .post(&self.bundler_url)
            .json(&JsonRpcRequest {
                jsonrpc: "2.0",
                id: 1,
                method,
                params,
            })
            .send()
            .await?;

        let parsed: JsonRpcResponse<T> = response.json().await?;

        if let Some(rpc_error) = parsed.error {
            error!("RPC error {}: {}", rpc_error.code, rpc_error.message);
            return Err(AppError::ExternalApi(format!(
                "RPC error {}: {}",
                rpc_error.code, rpc_error.message
            )));
        }

        Ok(parsed.result)
    }

    /// Token IDs minteados, leídos de los eventos Transfer de los contratos NFT
    fn parse_mint_result(&self, receipt: &UserOperationReceipt) -> MintResult {
        let mut result = MintResult {
            vehicle_token_id: None,
            synthetic_token_id: None,
        };

        for log in &receipt.receipt.logs {
            if log.topics.len() != 4 || !eq_hex(&log.topics[0], TRANSFER_TOPIC) {
                continue;
            }

            let Some(token_id) = parse_topic_token_id(&log.topics[3]) else {
                continue;
            };

            if eq_hex(&log.address, &self.vehicle_nft_address) {
                result.vehicle_token_id = Some(token_id);
            } else if eq_hex(&log.address, &self.synthetic_nft_address) {
                result.synthetic_token_id = Some(token_id);
            }
        }

        result
    }
}

fn field(name: &str, field_type: &str) -> TypedDataField {
    TypedDataField {
        name: name.to_string(),
        field_type: field_type.to_string(),
    }
}

fn eq_hex(a: &str, b: &str) -> bool {
    a.trim_start_matches("0x")
        .eq_ignore_ascii_case(b.trim_start_matches("0x"))
}

fn parse_topic_token_id(topic: &str) -> Option<i64> {
    let bytes = hex::decode(topic.trim_start_matches("0x")).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[24..]);
    Some(i64::from_be_bytes(word))
}

fn decode_hex(value: &str) -> AppResult<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| AppError::Crypto(format!("invalid hex payload: {}", e)))
}

// --- Codificación ABI mínima para los calldata del registry ---

enum AbiToken {
    Static([u8; 32]),
    Dynamic(Vec<u8>),
}

fn abi_uint(value: u128) -> AbiToken {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    AbiToken::Static(word)
}

fn abi_uint_str(value: &str) -> AppResult<AbiToken> {
    let parsed: u128 = value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid token id: {}", value)))?;
    Ok(abi_uint(parsed))
}

fn abi_address(value: &str) -> AppResult<AbiToken> {
    let bytes = decode_hex(value)?;
    if bytes.len() != 20 {
        return Err(AppError::Crypto("address must be 20 bytes".to_string()));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(AbiToken::Static(word))
}

fn abi_dynamic_bytes(value: &[u8]) -> AbiToken {
    let mut encoded = [0u8; 32];
    encoded[16..].copy_from_slice(&(value.len() as u128).to_be_bytes());

    let mut tail = encoded.to_vec();
    tail.extend_from_slice(value);
    // padding a múltiplo de 32
    let remainder = value.len() % 32;
    if remainder != 0 {
        tail.extend(std::iter::repeat(0u8).take(32 - remainder));
    }
    AbiToken::Dynamic(tail)
}

fn abi_dynamic_string(value: &str) -> AbiToken {
    abi_dynamic_bytes(value.as_bytes())
}

/// string[]: longitud, offsets por elemento y cada string como bytes dinámicos
fn abi_string_array(values: &[String]) -> AbiToken {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&(values.len() as u128).to_be_bytes());
    let mut out = word.to_vec();

    let head_len = values.len() * 32;
    let mut offsets: Vec<u8> = Vec::with_capacity(head_len);
    let mut tail: Vec<u8> = Vec::new();

    for value in values {
        let mut offset = [0u8; 32];
        offset[16..].copy_from_slice(&((head_len + tail.len()) as u128).to_be_bytes());
        offsets.extend_from_slice(&offset);

        let AbiToken::Dynamic(encoded) = abi_dynamic_string(value) else {
            unreachable!()
        };
        tail.extend_from_slice(&encoded);
    }

    out.extend_from_slice(&offsets);
    out.extend_from_slice(&tail);
    AbiToken::Dynamic(out)
}

/// selector(signature) ‖ head words ‖ tail dinámico
fn encode_call(signature: &str, tokens: &[AbiToken]) -> Vec<u8> {
    let selector = &keccak256(signature.as_bytes())[..4];

    let head_len = tokens.len() * 32;
    let mut head: Vec<u8> = Vec::with_capacity(head_len);
    let mut tail: Vec<u8> = Vec::new();

    for token in tokens {
        match token {
            AbiToken::Static(word) => head.extend_from_slice(word),
            AbiToken::Dynamic(data) => {
                let mut offset = [0u8; 32];
                offset[16..].copy_from_slice(&((head_len + tail.len()) as u128).to_be_bytes());
                head.extend_from_slice(&offset);
                tail.extend_from_slice(data);
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(selector);
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EnvironmentConfig {
        EnvironmentConfig::for_tests()
    }

    #[test]
    fn test_config_validation_is_fatal() {
        let mut config = test_config();
        config.rpc_url.clear();
        assert!(TransactionsClient::new(&config).is_err());

        let mut config = test_config();
        config.bundler_url.clear();
        assert!(TransactionsClient::new(&config).is_err());

        let mut config = test_config();
        config.registry_address.clear();
        assert!(TransactionsClient::new(&config).is_err());

        let mut config = test_config();
        config.chain_id = 0;
        assert!(TransactionsClient::new(&config).is_err());

        assert!(TransactionsClient::new(&test_config()).is_ok());
    }

    #[test]
    fn test_typed_data_has_registry_domain() {
        let client = TransactionsClient::new(&test_config()).unwrap();
        let typed_data = client.get_mint_sd_typed_data("1", 101);

        assert_eq!(typed_data.primary_type, "MintSyntheticDeviceSign");
        assert_eq!(typed_data.domain["chainId"], 137);
        assert_eq!(
            typed_data.domain["verifyingContract"],
            "0x2902a1a1b1b1c1d1e1f101112131415161718191"
        );
        // y el digest tiene que ser computable
        assert!(typed_data.digest().is_ok());
    }

    #[test]
    fn test_typed_data_variants_differ() {
        let client = TransactionsClient::new(&test_config()).unwrap();
        let v1 = client.get_mint_sd_typed_data("1", 101);
        let v2 = client.get_mint_sd_typed_data_v2("9", 101);
        assert_ne!(v1.digest().unwrap(), v2.digest().unwrap());
    }

    #[test]
    fn test_burn_user_operation_hash_is_stable() {
        let client = TransactionsClient::new(&test_config()).unwrap();
        let owner = "0xdddd1a1b1b1c1d1e1f10111213141516171819dd";

        let (op_a, hash_a) = client
            .get_burn_sd_by_owner_user_operation_and_hash(owner, 202)
            .unwrap();
        let (_, hash_b) = client
            .get_burn_sd_by_owner_user_operation_and_hash(owner, 202)
            .unwrap();
        let (_, hash_c) = client
            .get_burn_sd_by_owner_user_operation_and_hash(owner, 203)
            .unwrap();

        assert_eq!(hash_a, hash_b);
        assert_ne!(hash_a, hash_c);
        assert_eq!(op_a.sender, owner);
        assert!(op_a.call_data.starts_with("0x"));
    }

    #[test]
    fn test_send_rejects_unsigned_operation() {
        let client = TransactionsClient::new(&test_config()).unwrap();
        let (op, _) = client
            .get_burn_sd_by_owner_user_operation_and_hash(
                "0xdddd1a1b1b1c1d1e1f10111213141516171819dd",
                202,
            )
            .unwrap();

        let result = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(client.send_signed_user_operation(&op));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_mint_result_reads_transfer_logs() {
        let client = TransactionsClient::new(&test_config()).unwrap();

        let receipt = UserOperationReceipt {
            success: true,
            receipt: TransactionReceipt {
                logs: vec![
                    LogEntry {
                        address: "0xaaaa1a1b1b1c1d1e1f10111213141516171819aa".into(),
                        topics: vec![
                            TRANSFER_TOPIC.into(),
                            format!("0x{}", "0".repeat(64)),
                            format!("0x{}", "1".repeat(64)),
                            format!("0x{:064x}", 101),
                        ],
                    },
                    LogEntry {
                        address: "0xBBBB1A1B1B1C1D1E1F10111213141516171819BB".into(),
                        topics: vec![
                            TRANSFER_TOPIC.into(),
                            format!("0x{}", "0".repeat(64)),
                            format!("0x{}", "1".repeat(64)),
                            format!("0x{:064x}", 202),
                        ],
                    },
                    // log ajeno, se ignora
                    LogEntry {
                        address: "0x2902a1a1b1b1c1d1e1f101112131415161718191".into(),
                        topics: vec![TRANSFER_TOPIC.into()],
                    },
                ],
            },
        };

        let result = client.parse_mint_result(&receipt);
        assert_eq!(result.vehicle_token_id, Some(101));
        assert_eq!(result.synthetic_token_id, Some(202));
    }

    #[test]
    fn test_abi_string_array_layout() {
        let AbiToken::Dynamic(encoded) =
            abi_string_array(&["Make".to_string(), "Ford".to_string()])
        else {
            panic!("expected dynamic token")
        };

        // longitud
        assert_eq!(encoded[31], 2);
        // offset del primer elemento: 2 palabras de offsets
        assert_eq!(encoded[32 + 31], 64);
        // primer elemento: longitud 4 y el contenido con padding
        assert_eq!(encoded[96 + 31], 4);
        assert_eq!(&encoded[128..132], b"Make");
    }

    #[test]
    fn test_encode_call_layout() {
        let call = encode_call(
            "burnSyntheticDeviceSign(uint256)",
            &[abi_uint(202)],
        );
        // selector + una palabra estática
        assert_eq!(call.len(), 4 + 32);
        assert_eq!(call[4 + 31], 202);

        let dynamic = encode_call(
            "withBytes(uint256,bytes)",
            &[abi_uint(1), abi_dynamic_bytes(&[0xab; 33])],
        );
        // selector + 2 head words + longitud + 64 bytes de payload con padding
        assert_eq!(dynamic.len(), 4 + 64 + 32 + 64);
        // offset del tail apunta justo después de la head
        assert_eq!(dynamic[4 + 32 + 31], 64);
    }
}
