//! Máquina de estados del onboarding
//!
//! Códigos enteros por fase; `x % 10 == 2` siempre significa fallo.
//! Los predicados de este módulo gobiernan qué job se admite en qué estado.

// 0-9 estado inicial del submit de verificación
pub const SUBMIT_UNKNOWN: i32 = 0;
pub const SUBMIT_PENDING: i32 = 1;
pub const SUBMIT_FAILURE: i32 = 2;
pub const SUBMIT_SUCCESS: i32 = 3;

// 10-19 decodificación inicial del VIN
pub const DECODING_UNKNOWN: i32 = 10;
pub const DECODING_PENDING: i32 = 11;
pub const DECODING_FAILURE: i32 = 12;
pub const DECODING_SUCCESS: i32 = 13;

// 20-29 validación en el sistema del vendor externo
pub const VENDOR_VALIDATION_UNKNOWN: i32 = 20;
pub const VENDOR_VALIDATION_PENDING: i32 = 21;
pub const VENDOR_VALIDATION_FAILURE: i32 = 22;
pub const VENDOR_VALIDATION_SUCCESS: i32 = 23;

// 30-39 submit del mint
pub const MINT_SUBMIT_UNKNOWN: i32 = 30;
pub const MINT_SUBMIT_PENDING: i32 = 31;
pub const MINT_SUBMIT_FAILURE: i32 = 32;
pub const MINT_SUBMIT_SUCCESS: i32 = 33;

// 40-49 conexión con el vendor
pub const CONNECT_UNKNOWN: i32 = 40;
pub const CONNECT_PENDING: i32 = 41;
pub const CONNECT_FAILURE: i32 = 42;
pub const CONNECT_SUCCESS: i32 = 43;

// 50-59 minting
pub const MINT_UNKNOWN: i32 = 50;
pub const MINT_PENDING: i32 = 51;
pub const MINT_FAILURE: i32 = 52;
pub const MINT_SUCCESS: i32 = 53;

// 60-69 submit del disconnect
pub const DISCONNECT_SUBMIT_UNKNOWN: i32 = 60;
pub const DISCONNECT_SUBMIT_PENDING: i32 = 61;
pub const DISCONNECT_SUBMIT_FAILURE: i32 = 62;
pub const DISCONNECT_SUBMIT_SUCCESS: i32 = 63;

// 70-79 desconexión del vendor
pub const DISCONNECT_UNKNOWN: i32 = 70;
pub const DISCONNECT_PENDING: i32 = 71;
pub const DISCONNECT_FAILURE: i32 = 72;
pub const DISCONNECT_SUCCESS: i32 = 73;

// 80-89 burn del dispositivo sintético
pub const BURN_SD_UNKNOWN: i32 = 80;
pub const BURN_SD_PENDING: i32 = 81;
pub const BURN_SD_FAILURE: i32 = 82;
pub const BURN_SD_SUCCESS: i32 = 83;

// 90-99 submit del delete
pub const DELETE_SUBMIT_UNKNOWN: i32 = 90;
pub const DELETE_SUBMIT_PENDING: i32 = 91;
pub const DELETE_SUBMIT_FAILURE: i32 = 92;
pub const DELETE_SUBMIT_SUCCESS: i32 = 93;

// 100-103 burn del vehículo
pub const BURN_VEHICLE_UNKNOWN: i32 = 100;
pub const BURN_VEHICLE_PENDING: i32 = 101;
pub const BURN_VEHICLE_FAILURE: i32 = 102;
pub const BURN_VEHICLE_SUCCESS: i32 = 103;

pub fn is_verified(status: i32) -> bool {
    status >= VENDOR_VALIDATION_SUCCESS
}

pub fn is_minted(status: i32) -> bool {
    status == MINT_SUCCESS
}

pub fn is_disconnected(status: i32) -> bool {
    status == BURN_SD_SUCCESS
}

pub fn is_failure(status: i32) -> bool {
    status % 10 == 2
}

pub fn is_pending(status: i32) -> bool {
    status > 0 && status < MINT_SUCCESS
}

pub fn is_mint_pending(status: i32) -> bool {
    status > MINT_SUBMIT_UNKNOWN && status < MINT_SUCCESS
}

pub fn is_disconnect_pending(status: i32) -> bool {
    (status > DISCONNECT_SUBMIT_UNKNOWN && status < BURN_SD_SUCCESS) && !is_failure(status)
}

pub fn is_disconnect_failed(status: i32) -> bool {
    status == DISCONNECT_SUBMIT_FAILURE
        || status == DISCONNECT_FAILURE
        || status == BURN_SD_FAILURE
}

pub fn is_burn_pending(status: i32) -> bool {
    status > DELETE_SUBMIT_UNKNOWN && status < BURN_VEHICLE_SUCCESS
}

/// Vista externa del estado de verificación
pub fn verification_status(status: i32) -> &'static str {
    if is_verified(status) {
        return "Success";
    }

    if is_failure(status) {
        return "Failure";
    }

    if is_pending(status) {
        return "Pending";
    }

    "Unknown"
}

/// Vista externa del estado de minting
pub fn mint_status(status: i32) -> &'static str {
    if status == MINT_SUCCESS {
        return "Success";
    }

    if is_failure(status) {
        return "Failure";
    }

    if is_pending(status) {
        return "Pending";
    }

    "Unknown"
}

/// Vista externa del estado de desconexión
pub fn disconnect_status(status: i32) -> &'static str {
    if status == BURN_SD_SUCCESS {
        return "Success";
    }

    if is_failure(status) {
        return "Failure";
    }

    if is_disconnect_pending(status) {
        return "Pending";
    }

    "Unknown"
}

/// Vista externa del estado de borrado (burn del vehículo)
pub fn burn_status(status: i32) -> &'static str {
    if status == BURN_VEHICLE_SUCCESS {
        return "Success";
    }

    if is_failure(status) {
        return "Failure";
    }

    if is_burn_pending(status) {
        return "Pending";
    }

    "Unknown"
}

/// Nombre textual detallado de cada estado
pub fn detailed_status(status: i32) -> &'static str {
    match status {
        SUBMIT_UNKNOWN => "VerificationSubmitUnknown",
        SUBMIT_PENDING => "VerificationSubmitPending",
        SUBMIT_FAILURE => "VerificationSubmitFailure",
        SUBMIT_SUCCESS => "VerificationSubmitSuccess",
        DECODING_UNKNOWN => "DecodingUnknown",
        DECODING_PENDING => "DecodingPending",
        DECODING_FAILURE => "DecodingFailure",
        DECODING_SUCCESS => "DecodingSuccess",
        VENDOR_VALIDATION_UNKNOWN => "VendorValidationUnknown",
        VENDOR_VALIDATION_PENDING => "VendorValidationPending",
        VENDOR_VALIDATION_FAILURE => "VendorValidationFailure",
        VENDOR_VALIDATION_SUCCESS => "VendorValidationSuccess",
        MINT_SUBMIT_UNKNOWN => "MintSubmitUnknown",
        MINT_SUBMIT_PENDING => "MintSubmitPending",
        MINT_SUBMIT_FAILURE => "MintSubmitFailure",
        MINT_SUBMIT_SUCCESS => "MintSubmitSuccess",
        CONNECT_UNKNOWN => "ConnectUnknown",
        CONNECT_PENDING => "ConnectPending",
        CONNECT_FAILURE => "ConnectFailure",
        CONNECT_SUCCESS => "ConnectSuccess",
        MINT_UNKNOWN => "MintUnknown",
        MINT_PENDING => "MintPending",
        MINT_FAILURE => "MintFailure",
        MINT_SUCCESS => "MintSuccess",
        DISCONNECT_SUBMIT_UNKNOWN => "DisconnectSubmitUnknown",
        DISCONNECT_SUBMIT_PENDING => "DisconnectSubmitPending",
        DISCONNECT_SUBMIT_FAILURE => "DisconnectSubmitFailure",
        DISCONNECT_SUBMIT_SUCCESS => "DisconnectSubmitSuccess",
        DISCONNECT_UNKNOWN => "DisconnectUnknown",
        DISCONNECT_PENDING => "DisconnectPending",
        DISCONNECT_FAILURE => "DisconnectFailure",
        DISCONNECT_SUCCESS => "DisconnectSuccess",
        BURN_SD_UNKNOWN => "BurnSDUnknown",
        BURN_SD_PENDING => "BurnSDPending",
        BURN_SD_FAILURE => "BurnSDFailure",
        BURN_SD_SUCCESS => "BurnSDSuccess",
        DELETE_SUBMIT_UNKNOWN => "DeleteSubmitUnknown",
        DELETE_SUBMIT_PENDING => "DeleteSubmitPending",
        DELETE_SUBMIT_FAILURE => "DeleteSubmitFailure",
        DELETE_SUBMIT_SUCCESS => "DeleteSubmitSuccess",
        BURN_VEHICLE_UNKNOWN => "BurnVehicleUnknown",
        BURN_VEHICLE_PENDING => "BurnVehiclePending",
        BURN_VEHICLE_FAILURE => "BurnVehicleFailure",
        BURN_VEHICLE_SUCCESS => "BurnVehicleSuccess",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_set() {
        let failures: Vec<i32> = (0..=103).filter(|s| is_failure(*s)).collect();
        assert_eq!(failures, vec![2, 12, 22, 32, 42, 52, 62, 72, 82, 92, 102]);
    }

    #[test]
    fn test_verification_status_views() {
        assert_eq!(verification_status(MINT_SUCCESS), "Success");
        assert_eq!(verification_status(VENDOR_VALIDATION_FAILURE), "Failure");
        assert_eq!(verification_status(VENDOR_VALIDATION_PENDING), "Pending");
        assert_eq!(verification_status(SUBMIT_UNKNOWN), "Unknown");
    }

    #[test]
    fn test_mint_status_views() {
        assert_eq!(mint_status(MINT_SUCCESS), "Success");
        assert_eq!(mint_status(MINT_FAILURE), "Failure");
        assert_eq!(mint_status(MINT_PENDING), "Pending");
        assert_eq!(mint_status(BURN_SD_SUCCESS), "Unknown");
    }

    #[test]
    fn test_disconnect_status_views() {
        assert_eq!(disconnect_status(BURN_SD_SUCCESS), "Success");
        assert_eq!(disconnect_status(DISCONNECT_FAILURE), "Failure");
        assert_eq!(disconnect_status(DISCONNECT_PENDING), "Pending");
        assert_eq!(disconnect_status(MINT_SUCCESS), "Unknown");
    }

    #[test]
    fn test_burn_status_views() {
        assert_eq!(burn_status(BURN_VEHICLE_SUCCESS), "Success");
        assert_eq!(burn_status(BURN_VEHICLE_FAILURE), "Failure");
        assert_eq!(burn_status(BURN_VEHICLE_PENDING), "Pending");
        assert_eq!(burn_status(BURN_SD_SUCCESS), "Unknown");
    }

    #[test]
    fn test_pending_predicates() {
        assert!(is_pending(SUBMIT_PENDING));
        assert!(is_pending(MINT_PENDING));
        assert!(!is_pending(SUBMIT_UNKNOWN));
        assert!(!is_pending(MINT_SUCCESS));

        assert!(is_mint_pending(MINT_SUBMIT_PENDING));
        assert!(is_mint_pending(CONNECT_PENDING));
        assert!(!is_mint_pending(MINT_SUBMIT_UNKNOWN));
        assert!(!is_mint_pending(MINT_SUCCESS));
    }

    #[test]
    fn test_disconnect_pending_excludes_failures() {
        assert!(is_disconnect_pending(DISCONNECT_SUBMIT_PENDING));
        assert!(is_disconnect_pending(BURN_SD_PENDING));
        assert!(!is_disconnect_pending(DISCONNECT_FAILURE));
        assert!(!is_disconnect_pending(BURN_SD_FAILURE));
        assert!(!is_disconnect_pending(BURN_SD_SUCCESS));
    }

    #[test]
    fn test_disconnect_failed_set() {
        for status in 0..=103 {
            let expected = status == 62 || status == 72 || status == 82;
            assert_eq!(is_disconnect_failed(status), expected, "status {}", status);
        }
    }

    #[test]
    fn test_milestones() {
        assert!(is_verified(VENDOR_VALIDATION_SUCCESS));
        assert!(!is_verified(VENDOR_VALIDATION_FAILURE));
        assert!(is_minted(MINT_SUCCESS));
        assert!(!is_minted(MINT_PENDING));
        assert!(is_disconnected(BURN_SD_SUCCESS));
        assert!(!is_disconnected(BURN_VEHICLE_SUCCESS));
    }

    #[test]
    fn test_detailed_status_names() {
        assert_eq!(detailed_status(SUBMIT_PENDING), "VerificationSubmitPending");
        assert_eq!(detailed_status(MINT_SUCCESS), "MintSuccess");
        assert_eq!(detailed_status(BURN_SD_SUCCESS), "BurnSDSuccess");
        assert_eq!(detailed_status(999), "Unknown");
    }
}
