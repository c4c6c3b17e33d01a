//! Hashing EIP-712 de typed-data
//!
//! Este módulo implementa el digest EIP-712 (encodeType / hashStruct /
//! domain separator) para los payloads que produce el cliente de
//! transacciones y que firman las wallets de dispositivos sintéticos.
//! El formato wire es el mismo JSON que usan los signers de Ethereum:
//! `{types, primaryType, domain, message}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha3::{Digest, Keccak256};

use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypedDataField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Payload typed-data firmable, tal como viaja entre el backend y el cliente
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedData {
    pub types: BTreeMap<String, Vec<TypedDataField>>,
    #[serde(rename = "primaryType")]
    pub primary_type: String,
    pub domain: serde_json::Map<String, Value>,
    pub message: serde_json::Map<String, Value>,
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

impl TypedData {
    /// Digest final a firmar: keccak256(0x1901 ‖ domainSeparator ‖ hashStruct(message))
    pub fn digest(&self) -> AppResult<[u8; 32]> {
        let domain_separator = self.hash_struct("EIP712Domain", &self.domain)?;
        let message_hash = self.hash_struct(&self.primary_type, &self.message)?;

        let mut buffer = Vec::with_capacity(66);
        buffer.extend_from_slice(&[0x19, 0x01]);
        buffer.extend_from_slice(&domain_separator);
        buffer.extend_from_slice(&message_hash);

        Ok(keccak256(&buffer))
    }

    pub fn hash_struct(
        &self,
        type_name: &str,
        data: &serde_json::Map<String, Value>,
    ) -> AppResult<[u8; 32]> {
        let type_hash = keccak256(self.encode_type(type_name)?.as_bytes());

        let mut encoded = Vec::new();
        encoded.extend_from_slice(&type_hash);
        encoded.extend_from_slice(&self.encode_data(type_name, data)?);

        Ok(keccak256(&encoded))
    }

    /// encodeType: tipo primario seguido de sus dependencias en orden alfabético
    fn encode_type(&self, type_name: &str) -> AppResult<String> {
        let mut deps = Vec::new();
        self.collect_dependencies(type_name, &mut deps)?;
        deps.retain(|d| d != type_name);
        deps.sort();
        deps.insert(0, type_name.to_string());

        let mut result = String::new();
        for dep in deps {
            let fields = self
                .types
                .get(&dep)
                .ok_or_else(|| AppError::Crypto(format!("unknown typed data type: {}", dep)))?;
            let field_list: Vec<String> = fields
                .iter()
                .map(|f| format!("{} {}", f.field_type, f.name))
                .collect();
            result.push_str(&format!("{}({})", dep, field_list.join(",")));
        }

        Ok(result)
    }

    fn collect_dependencies(&self, type_name: &str, found: &mut Vec<String>) -> AppResult<()> {
        if found.iter().any(|f| f == type_name) {
            return Ok(());
        }

        let Some(fields) = self.types.get(type_name) else {
            return Ok(());
        };

        found.push(type_name.to_string());
        for field in fields {
            let base = base_type(&field.field_type);
            if self.types.contains_key(base) {
                self.collect_dependencies(base, found)?;
            }
        }

        Ok(())
    }

    fn encode_data(
        &self,
        type_name: &str,
        data: &serde_json::Map<String, Value>,
    ) -> AppResult<Vec<u8>> {
        let fields = self
            .types
            .get(type_name)
            .ok_or_else(|| AppError::Crypto(format!("unknown typed data type: {}", type_name)))?;

        let mut encoded = Vec::with_capacity(fields.len() * 32);
        for field in fields {
            let value = data.get(&field.name).unwrap_or(&Value::Null);
            let word = self.encode_value(&field.field_type, value)?;
            encoded.extend_from_slice(&word);
        }

        Ok(encoded)
    }

    fn encode_value(&self, field_type: &str, value: &Value) -> AppResult<[u8; 32]> {
        // Arrays: keccak de la concatenación de los elementos codificados
        if field_type.ends_with(']') {
            let element_type = field_type
                .rsplit_once('[')
                .map(|(t, _)| t)
                .ok_or_else(|| AppError::Crypto(format!("malformed array type: {}", field_type)))?;
            let items = value
                .as_array()
                .ok_or_else(|| AppError::Crypto(format!("expected array for {}", field_type)))?;

            let mut encoded = Vec::with_capacity(items.len() * 32);
            for item in items {
                encoded.extend_from_slice(&self.encode_value(element_type, item)?);
            }
            return Ok(keccak256(&encoded));
        }

        // Structs anidados
        if self.types.contains_key(field_type) {
            let object = value
                .as_object()
                .ok_or_else(|| AppError::Crypto(format!("expected object for {}", field_type)))?;
            return self.hash_struct(field_type, object);
        }

        match field_type {
            "string" => {
                let s = value
                    .as_str()
                    .ok_or_else(|| AppError::Crypto("expected string value".to_string()))?;
                Ok(keccak256(s.as_bytes()))
            }
            "bytes" => {
                let bytes = decode_hex_value(value)?;
                Ok(keccak256(&bytes))
            }
            "address" => {
                let bytes = decode_hex_value(value)?;
                if bytes.len() != 20 {
                    return Err(AppError::Crypto("address must be 20 bytes".to_string()));
                }
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(&bytes);
                Ok(word)
            }
            "bool" => {
                let b = value
                    .as_bool()
                    .ok_or_else(|| AppError::Crypto("expected bool value".to_string()))?;
                let mut word = [0u8; 32];
                word[31] = b as u8;
                Ok(word)
            }
            t if t.starts_with("bytes") => {
                let size: usize = t[5..]
                    .parse()
                    .map_err(|_| AppError::Crypto(format!("malformed type: {}", t)))?;
                let bytes = decode_hex_value(value)?;
                if bytes.len() != size || size > 32 {
                    return Err(AppError::Crypto(format!("expected {} bytes for {}", size, t)));
                }
                let mut word = [0u8; 32];
                word[..bytes.len()].copy_from_slice(&bytes);
                Ok(word)
            }
            t if t.starts_with("uint") => encode_uint(value),
            t if t.starts_with("int") => encode_int(value),
            other => Err(AppError::Crypto(format!(
                "unsupported typed data type: {}",
                other
            ))),
        }
    }
}

/// Tipo base de un campo, sin sufijos de array
fn base_type(field_type: &str) -> &str {
    match field_type.find('[') {
        Some(idx) => &field_type[..idx],
        None => field_type,
    }
}

fn decode_hex_value(value: &Value) -> AppResult<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| AppError::Crypto("expected hex string value".to_string()))?;
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| AppError::Crypto(format!("invalid hex value: {}", e)))
}

/// Codifica un unsigned de hasta 256 bits como palabra big-endian.
/// Acepta números JSON, strings decimales y strings hex "0x...".
fn encode_uint(value: &Value) -> AppResult<[u8; 32]> {
    let mut word = [0u8; 32];

    match value {
        Value::Number(n) => {
            let v = n
                .as_u64()
                .ok_or_else(|| AppError::Crypto(format!("invalid uint value: {}", n)))?;
            word[24..].copy_from_slice(&v.to_be_bytes());
            Ok(word)
        }
        Value::String(s) => {
            if let Some(hex_str) = s.strip_prefix("0x") {
                let bytes = hex::decode(hex_str)
                    .map_err(|e| AppError::Crypto(format!("invalid hex uint: {}", e)))?;
                if bytes.len() > 32 {
                    return Err(AppError::Crypto("uint value exceeds 256 bits".to_string()));
                }
                word[32 - bytes.len()..].copy_from_slice(&bytes);
                Ok(word)
            } else {
                let v: u128 = s
                    .parse()
                    .map_err(|_| AppError::Crypto(format!("invalid uint value: {}", s)))?;
                word[16..].copy_from_slice(&v.to_be_bytes());
                Ok(word)
            }
        }
        other => Err(AppError::Crypto(format!("invalid uint value: {}", other))),
    }
}

/// Codifica un signed como palabra de 256 bits en complemento a dos
fn encode_int(value: &Value) -> AppResult<[u8; 32]> {
    let v: i128 = match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| AppError::Crypto(format!("invalid int value: {}", n)))?,
        Value::String(s) => s
            .parse()
            .map_err(|_| AppError::Crypto(format!("invalid int value: {}", s)))?,
        other => return Err(AppError::Crypto(format!("invalid int value: {}", other))),
    };

    let fill = if v < 0 { 0xff } else { 0x00 };
    let mut word = [fill; 32];
    word[16..].copy_from_slice(&v.to_be_bytes());
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Ejemplo canónico de EIP-712 (Ether Mail)
    fn mail_typed_data() -> TypedData {
        serde_json::from_value(json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "version", "type": "string"},
                    {"name": "chainId", "type": "uint256"},
                    {"name": "verifyingContract", "type": "address"}
                ],
                "Person": [
                    {"name": "name", "type": "string"},
                    {"name": "wallet", "type": "address"}
                ],
                "Mail": [
                    {"name": "from", "type": "Person"},
                    {"name": "to", "type": "Person"},
                    {"name": "contents", "type": "string"}
                ]
            },
            "primaryType": "Mail",
            "domain": {
                "name": "Ether Mail",
                "version": "1",
                "chainId": 1,
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
            },
            "message": {
                "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
                "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
                "contents": "Hello, Bob!"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_encode_type() {
        let td = mail_typed_data();
        assert_eq!(
            td.encode_type("Mail").unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
    }

    #[test]
    fn test_domain_separator() {
        let td = mail_typed_data();
        let separator = td.hash_struct("EIP712Domain", &td.domain).unwrap();
        assert_eq!(
            hex::encode(separator),
            "f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );
    }

    #[test]
    fn test_message_hash() {
        let td = mail_typed_data();
        let hash = td.hash_struct("Mail", &td.message).unwrap();
        assert_eq!(
            hex::encode(hash),
            "c52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e"
        );
    }

    #[test]
    fn test_digest() {
        let td = mail_typed_data();
        let digest = td.digest().unwrap();
        assert_eq!(
            hex::encode(digest),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn test_uint_encodings_agree() {
        let a = encode_uint(&json!(123456)).unwrap();
        let b = encode_uint(&json!("123456")).unwrap();
        let c = encode_uint(&json!("0x1e240")).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_wire_format_roundtrip() {
        let td = mail_typed_data();
        let serialized = serde_json::to_string(&td).unwrap();
        let reparsed: TypedData = serde_json::from_str(&serialized).unwrap();
        assert_eq!(reparsed.primary_type, "Mail");
        assert_eq!(reparsed.digest().unwrap(), td.digest().unwrap());
    }
}
