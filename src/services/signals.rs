//! Validación y conversión de señales
//!
//! Mapa de señales canónicas conocidas, validación laxa (warn en nombres
//! desconocidos) y conversión de los campos del vendor a señales canónicas.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::models::telemetry::{Signal, VendorData};
use crate::utils::errors::{AppError, AppResult};

const MILES_TO_KILOMETERS: f64 = 1.609344;

/// Señales canónicas aceptadas por el pipeline de ingesta
pub const KNOWN_SIGNALS: &[&str] = &[
    "speed",
    "powertrainFuelSystemRelativeLevel",
    "powertrainFuelSystemAbsoluteLevel",
    "powertrainTransmissionTravelledDistance",
    "currentLocationLatitude",
    "currentLocationLongitude",
    "currentLocationAltitude",
    "powertrainTractionBatteryStateOfChargeCurrent",
    "powertrainTractionBatteryChargingIsCharging",
    "exteriorAirTemperature",
    "chassisAxleRow1WheelLeftTirePressure",
    "chassisAxleRow1WheelRightTirePressure",
    "obdRunTime",
    "isIgnitionOn",
];

pub fn is_known_signal(name: &str) -> bool {
    KNOWN_SIGNALS.contains(&name)
}

/// Valida el array `data.signals`. Nombres desconocidos solo advierten;
/// un payload sin forma de array sí es un error.
pub fn validate_signals(signals: &Value, vin: &str) -> AppResult<()> {
    let entries = signals
        .as_array()
        .ok_or_else(|| AppError::BadRequest("signals is not an array".to_string()))?;

    for entry in entries {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            warn!("Señal sin nombre para VIN {}: {}", vin, entry);
            continue;
        };

        if !is_known_signal(name) {
            warn!("Señal desconocida {} para VIN {}", name, vin);
        }
    }

    Ok(())
}

/// Convierte los campos del vendor a señales canónicas:
/// fuel acotado a (0, 100], odómetro en millas → kilómetros,
/// lat/lon solo cuando no son cero.
pub fn map_vendor_data_to_signals(data: &VendorData, ts: DateTime<Utc>) -> Vec<Signal> {
    let mut signals = Vec::new();

    signals.push(Signal {
        name: "speed".to_string(),
        timestamp: ts,
        value: data.speed.value,
    });

    if data.fuel_level.value > 0.0 && data.fuel_level.value <= 100.0 {
        signals.push(Signal {
            name: "powertrainFuelSystemRelativeLevel".to_string(),
            timestamp: ts,
            value: data.fuel_level.value,
        });
    }

    signals.push(Signal {
        name: "powertrainTransmissionTravelledDistance".to_string(),
        timestamp: ts,
        value: miles_to_kilometers(data.odometer.value),
    });

    if data.location.lon != 0.0 {
        signals.push(Signal {
            name: "currentLocationLongitude".to_string(),
            timestamp: ts,
            value: data.location.lon,
        });
    }

    if data.location.lat != 0.0 {
        signals.push(Signal {
            name: "currentLocationLatitude".to_string(),
            timestamp: ts,
            value: data.location.lat,
        });
    }

    signals
}

fn miles_to_kilometers(miles: f64) -> f64 {
    miles * MILES_TO_KILOMETERS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vendor_data(raw: Value) -> VendorData {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_validate_signals_accepts_unknown_names() {
        let signals = json!([
            {"name": "speed", "value": 55.0},
            {"name": "definitelyNotASignal", "value": 1.0},
            {"value": 2.0}
        ]);
        assert!(validate_signals(&signals, "1FTFW1ET5DFA12345").is_ok());
    }

    #[test]
    fn test_validate_signals_rejects_non_array() {
        let signals = json!({"name": "speed"});
        assert!(validate_signals(&signals, "1FTFW1ET5DFA12345").is_err());
    }

    #[test]
    fn test_fuel_level_bounds() {
        let ts = Utc::now();

        let in_range = vendor_data(json!({"fuelLevel": {"value": 55.0}}));
        let names: Vec<String> = map_vendor_data_to_signals(&in_range, ts)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(names.contains(&"powertrainFuelSystemRelativeLevel".to_string()));

        for out_of_range in [0.0, -5.0, 100.5] {
            let data = vendor_data(json!({"fuelLevel": {"value": out_of_range}}));
            let names: Vec<String> = map_vendor_data_to_signals(&data, ts)
                .into_iter()
                .map(|s| s.name)
                .collect();
            assert!(
                !names.contains(&"powertrainFuelSystemRelativeLevel".to_string()),
                "fuel {} should be dropped",
                out_of_range
            );
        }
    }

    #[test]
    fn test_odometer_converted_to_kilometers() {
        let data = vendor_data(json!({"odometer": {"value": 100.0, "units": "miles"}}));
        let signals = map_vendor_data_to_signals(&data, Utc::now());
        let odometer = signals
            .iter()
            .find(|s| s.name == "powertrainTransmissionTravelledDistance")
            .unwrap();
        assert!((odometer.value - 160.9344).abs() < 1e-9);
    }

    #[test]
    fn test_zero_location_dropped() {
        let data = vendor_data(json!({"location": {"lat": 0.0, "lon": 0.0}}));
        let names: Vec<String> = map_vendor_data_to_signals(&data, Utc::now())
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(!names.contains(&"currentLocationLatitude".to_string()));
        assert!(!names.contains(&"currentLocationLongitude".to_string()));

        let data = vendor_data(json!({"location": {"lat": 40.7, "lon": -74.0}}));
        let names: Vec<String> = map_vendor_data_to_signals(&data, Utc::now())
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(names.contains(&"currentLocationLatitude".to_string()));
        assert!(names.contains(&"currentLocationLongitude".to_string()));
    }
}
