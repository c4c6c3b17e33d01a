//! Envelope CloudEvent y mensajes de los topics del vendor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope CloudEvent tal como llega por el topic de telemetría sin buffer.
/// `data` se conserva crudo; el forwarder solo estampa producer/subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub producer: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(rename = "datacontenttype", default)]
    pub data_content_type: String,
    #[serde(rename = "dataversion", default)]
    pub data_version: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Señal canónica enviada al endpoint de ingesta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Campos propios del vendor, previos a la conversión a señales canónicas
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorData {
    #[serde(default)]
    pub location: VendorLocation,
    #[serde(default)]
    pub speed: VendorSignal,
    #[serde(default)]
    pub odometer: VendorSignal,
    #[serde(rename = "fuelLevel", default)]
    pub fuel_level: VendorSignal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorLocation {
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorSignal {
    #[serde(default)]
    pub value: f64,
    #[serde(rename = "signalType", default)]
    pub signal_type: String,
    #[serde(default)]
    pub units: String,
}

/// Error de operación reportado por el vendor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub description: String,
}

/// Mensaje del topic de operaciones del vendor (enrollment / unenrollment)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationMessage {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub operation_type: String,
    #[serde(default)]
    pub action: String,
    #[serde(rename = "createdTimestamp", default)]
    pub created_timestamp: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub vin: String,
    #[serde(default)]
    pub error: OperationError,
    #[serde(default)]
    pub data: OperationData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationData {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "vehicleId", default)]
    pub vehicle_id: String,
    #[serde(rename = "dataSource", default)]
    pub data_source: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub vin: String,
    #[serde(rename = "dataServices", default)]
    pub data_services: Vec<String>,
    #[serde(rename = "serialNumber", default)]
    pub serial_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_message_deserialization() {
        let raw = r#"{
            "id": "op-1",
            "type": "enrollment",
            "action": "enroll",
            "status": "succeeded",
            "vin": "1FTFW1ET5DFA12345",
            "data": {"vehicleId": "veh-77", "vin": "1FTFW1ET5DFA12345"}
        }"#;

        let message: OperationMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.operation_type, "enrollment");
        assert_eq!(message.action, "enroll");
        assert_eq!(message.data.vehicle_id, "veh-77");
        assert!(message.error.code.is_empty());
    }

    #[test]
    fn test_cloud_event_preserves_unknown_data() {
        let raw = r#"{
            "id": "evt-1",
            "source": "vendor",
            "type": "telemetry",
            "data": {"vin": "1FTFW1ET5DFA12345", "signals": [{"name": "speed", "value": 55.0}]}
        }"#;

        let event: CloudEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, "telemetry");
        let data = event.data.unwrap();
        assert_eq!(data["vin"], "1FTFW1ET5DFA12345");
    }
}
