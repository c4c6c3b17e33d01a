//! Wallets de dispositivos sintéticos
//!
//! Derivación jerárquica determinista (BIP32, secp256k1) a partir de una
//! semilla maestra de 64 bytes. Cada VIN minteado recibe el hijo hardened
//! en `2^31 + index`; el mismo índice produce siempre la misma clave.

use hmac::{Hmac, Mac};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, Scalar};
use sha2::Sha512;

use crate::utils::eip712::{keccak256, TypedData};
use crate::utils::errors::{AppError, AppResult};

type HmacSha512 = Hmac<Sha512>;

pub const HARDENED_KEY_START: u32 = 0x8000_0000;
const SEED_LEN: usize = 64;

pub struct SdWalletService {
    master_secret: [u8; 32],
    chain_code: [u8; 32],
}

impl SdWalletService {
    /// Construye el servicio desde la semilla hex. La longitud es exacta:
    /// cualquier otra cosa es un error fatal de arranque.
    pub fn new(seed_hex: &str) -> AppResult<Self> {
        let stripped = seed_hex.strip_prefix("0x").unwrap_or(seed_hex);
        let seed = hex::decode(stripped)
            .map_err(|e| AppError::Crypto(format!("invalid seed hex: {}", e)))?;

        if seed.len() != SEED_LEN {
            return Err(AppError::Crypto(format!(
                "seed must be {} bytes, got {}",
                SEED_LEN,
                seed.len()
            )));
        }

        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| AppError::Crypto(e.to_string()))?;
        mac.update(&seed);
        let digest = mac.finalize().into_bytes();

        let mut master_secret = [0u8; 32];
        let mut chain_code = [0u8; 32];
        master_secret.copy_from_slice(&digest[..32]);
        chain_code.copy_from_slice(&digest[32..]);

        // La clave maestra tiene que ser un escalar válido de secp256k1
        scalar_from_bytes(&master_secret)
            .ok_or_else(|| AppError::Crypto("derived master key is invalid".to_string()))?;

        Ok(Self {
            master_secret,
            chain_code,
        })
    }

    /// Dirección Ethereum del hijo `index`
    pub fn get_address(&self, index: u32) -> AppResult<[u8; 20]> {
        let signing_key = self.private_key(index)?;
        Ok(address_from_key(&signing_key))
    }

    pub fn get_address_hex(&self, index: u32) -> AppResult<String> {
        Ok(format!("0x{}", hex::encode(self.get_address(index)?)))
    }

    /// Firma de 65 bytes (r ‖ s ‖ v) sobre un hash de 32 bytes, v ∈ {27, 28}
    pub fn sign_hash(&self, hash: &[u8], index: u32) -> AppResult<[u8; 65]> {
        if hash.len() != 32 {
            return Err(AppError::Crypto(format!(
                "hash must be 32 bytes, got {}",
                hash.len()
            )));
        }

        let signing_key = self.private_key(index)?;
        let (signature, recovery_id): (Signature, RecoveryId) = signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| AppError::Crypto(format!("signing failed: {}", e)))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;

        Ok(out)
    }

    /// Digest EIP-712 del typed-data y firma con el hijo `index`
    pub fn sign_typed_data(&self, data: &TypedData, index: u32) -> AppResult<[u8; 65]> {
        let digest = data.digest()?;
        self.sign_hash(&digest, index)
    }

    /// CKDpriv hardened de un nivel: m / (2^31 + index)
    fn private_key(&self, index: u32) -> AppResult<SigningKey> {
        if index >= HARDENED_KEY_START {
            return Err(AppError::Crypto(format!(
                "child number {} >= 2^31",
                index
            )));
        }

        let child_number = HARDENED_KEY_START + index;

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| AppError::Crypto(e.to_string()))?;
        mac.update(&[0u8]);
        mac.update(&self.master_secret);
        mac.update(&child_number.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let il = scalar_from_bytes(&digest[..32])
            .ok_or_else(|| AppError::Crypto("derived tweak out of range".to_string()))?;
        let parent = scalar_from_bytes(&self.master_secret)
            .ok_or_else(|| AppError::Crypto("master key out of range".to_string()))?;

        let child = il + parent;
        if bool::from(child.is_zero()) {
            return Err(AppError::Crypto("derived child key is zero".to_string()));
        }

        SigningKey::from_bytes(&child.to_bytes())
            .map_err(|e| AppError::Crypto(format!("invalid child key: {}", e)))
    }
}

fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar> {
    let field_bytes = FieldBytes::clone_from_slice(bytes);
    Option::from(Scalar::from_repr(field_bytes)).filter(|s: &Scalar| !bool::from(s.is_zero()))
}

/// keccak256 del punto público sin comprimir, últimos 20 bytes
pub fn address_from_key(signing_key: &SigningKey) -> [u8; 20] {
    let verifying_key = VerifyingKey::from(signing_key);
    let encoded = verifying_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Recupera la dirección que firmó `hash` con una firma (r ‖ s ‖ v)
pub fn recover_address(hash: &[u8], signature: &[u8; 65]) -> AppResult<[u8; 20]> {
    let recovery_id = RecoveryId::try_from(signature[64].wrapping_sub(27))
        .map_err(|e| AppError::Crypto(format!("invalid recovery id: {}", e)))?;
    let parsed = Signature::try_from(&signature[..64])
        .map_err(|e| AppError::Crypto(format!("invalid signature: {}", e)))?;

    let verifying_key = VerifyingKey::recover_from_prehash(hash, &parsed, recovery_id)
        .map_err(|e| AppError::Crypto(format!("recovery failed: {}", e)))?;

    let encoded = verifying_key.to_encoded_point(false);
    let digest = keccak256(&encoded.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Ok(address)
}

/// Compara dos direcciones hex ignorando el checksum de mayúsculas
pub fn addresses_equal(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim_start_matches("0x").to_ascii_lowercase();
    !a.is_empty() && !b.is_empty() && norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 64 bytes, solo para tests
    const TEST_SEED: &str = "cabaabd8c7c7d27347349e48fb11319bc6656cb6cc1bdc717e94dae8db7e6bc2\
                             cabaabd8c7c7d27347349e48fb11319bc6656cb6cc1bdc717e94dae8db7e6bc2";

    fn service() -> SdWalletService {
        SdWalletService::new(TEST_SEED).unwrap()
    }

    #[test]
    fn test_seed_length_enforced() {
        assert!(SdWalletService::new("cabaab").is_err());
        assert!(SdWalletService::new("zz").is_err());
        assert!(SdWalletService::new(TEST_SEED).is_ok());
        assert!(SdWalletService::new(&format!("0x{}", TEST_SEED.replace(' ', ""))).is_ok());
    }

    #[test]
    fn test_addresses_are_deterministic() {
        let ws = service();

        let mut per_index: Vec<Vec<[u8; 20]>> = vec![Vec::new(); 5];
        for i in 0..1000u32 {
            let index = i % 5;
            per_index[index as usize].push(ws.get_address(index).unwrap());
        }

        for addresses in &per_index {
            assert_eq!(addresses.len(), 200);
            for address in addresses.iter().skip(1) {
                assert_eq!(address, &addresses[0]);
            }
        }
    }

    #[test]
    fn test_distinct_indices_distinct_addresses() {
        let ws = service();
        let a = ws.get_address(0).unwrap();
        let b = ws.get_address(1).unwrap();
        let c = ws.get_address(2_000_000).unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_index_bound() {
        let ws = service();
        assert!(ws.get_address(HARDENED_KEY_START - 1).is_ok());
        assert!(ws.get_address(HARDENED_KEY_START).is_err());
    }

    #[test]
    fn test_sign_and_recover_roundtrip() {
        let ws = service();

        for i in 0..5u32 {
            let address = ws.get_address(i).unwrap();
            for j in 0..20 {
                let message = format!("test message {}", j * 5 + i);
                let hash = keccak256(message.as_bytes());
                let signature = ws.sign_hash(&hash, i).unwrap();

                assert!(signature[64] == 27 || signature[64] == 28);

                let recovered = recover_address(&hash, &signature).unwrap();
                assert_eq!(recovered, address);
            }
        }
    }

    #[test]
    fn test_sign_rejects_bad_hash_length() {
        let ws = service();
        assert!(ws.sign_hash(&[0u8; 16], 0).is_err());
    }

    #[test]
    fn test_sign_typed_data_recovers_signer() {
        let ws = service();
        let typed_data: TypedData = serde_json::from_value(serde_json::json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "chainId", "type": "uint256"}
                ],
                "MintSyntheticDeviceSign": [
                    {"name": "integrationNode", "type": "uint256"},
                    {"name": "vehicleNode", "type": "uint256"}
                ]
            },
            "primaryType": "MintSyntheticDeviceSign",
            "domain": {"name": "Registry", "chainId": 137},
            "message": {"integrationNode": "1", "vehicleNode": "101"}
        }))
        .unwrap();

        let signature = ws.sign_typed_data(&typed_data, 7).unwrap();
        let digest = typed_data.digest().unwrap();
        let recovered = recover_address(&digest, &signature).unwrap();
        assert_eq!(recovered, ws.get_address(7).unwrap());
    }

    #[test]
    fn test_addresses_equal() {
        assert!(addresses_equal(
            "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826",
            "0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826"
        ));
        assert!(!addresses_equal("0xabc", "0xdef"));
        assert!(!addresses_equal("", ""));
    }
}
