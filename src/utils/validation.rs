//! Utilidades de validación
//!
//! Este módulo contiene las funciones de validación de VINs
//! compartidas por todos los handlers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::errors::{bad_request_error, AppResult};

/// Alfabeto restringido de un VIN: 17 caracteres, sin I, O ni Q.
static VIN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-HJ-NPR-Z0-9]{17}$").unwrap());

/// Validar un VIN. En modo test se acepta cualquier string de 17 caracteres.
pub fn is_valid_vin(vin: &str, test_mode: bool) -> bool {
    if test_mode {
        return vin.chars().count() == 17;
    }

    VIN_REGEX.is_match(vin)
}

/// Normaliza y valida una lista de VINs tal como llega de query o body:
/// trim, formato, sin duplicados, no vacía. 400 en cualquier otro caso.
pub fn sanitize_vins(vins: &[String], test_mode: bool) -> AppResult<Vec<String>> {
    let stripped: Vec<String> = vins.iter().map(|v| v.trim().to_string()).collect();

    let valid: Vec<String> = stripped
        .iter()
        .filter(|v| is_valid_vin(v, test_mode))
        .cloned()
        .collect();

    if valid.len() != stripped.len() {
        return Err(bad_request_error("Invalid VINs provided"));
    }

    if valid.is_empty() {
        return Err(bad_request_error("No VINs provided"));
    }

    if has_duplicates(&valid) {
        return Err(bad_request_error("Duplicated VINs"));
    }

    Ok(valid)
}

pub fn has_duplicates(vins: &[String]) -> bool {
    let mut seen = std::collections::HashSet::new();
    for vin in vins {
        if !seen.insert(vin) {
            return true;
        }
    }
    false
}

/// Parsear el parámetro `?vins=` (CSV) en una lista de strings
pub fn parse_vins_param(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_vin() {
        assert!(is_valid_vin("1FTFW1ET5DFA12345", false));
        assert!(is_valid_vin("ABCDEFGH123456789", false));
    }

    #[test]
    fn test_invalid_characters_rejected() {
        // I, O y Q no forman parte del alfabeto VIN
        assert!(!is_valid_vin("IFTFW1ET5DFA12345", false));
        assert!(!is_valid_vin("OFTFW1ET5DFA12345", false));
        assert!(!is_valid_vin("QFTFW1ET5DFA12345", false));
        assert!(!is_valid_vin("1ftfw1et5dfa12345", false));
    }

    #[test]
    fn test_invalid_length_rejected() {
        assert!(!is_valid_vin("1FTFW1ET5DFA1234", false));
        assert!(!is_valid_vin("1FTFW1ET5DFA123456", false));
        assert!(!is_valid_vin("", false));
    }

    #[test]
    fn test_test_mode_accepts_any_17_chars() {
        assert!(is_valid_vin("IIIIIIIIIIIIIIIII", true));
        assert!(is_valid_vin("lowercase17chars!", true));
        assert!(!is_valid_vin("short", true));
    }

    #[test]
    fn test_sanitize_rejects_duplicates() {
        let vins = vec![
            "ABCDEFG1234567811".to_string(),
            "ABCDEFG1234567811".to_string(),
        ];
        assert!(sanitize_vins(&vins, false).is_err());
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(sanitize_vins(&[], false).is_err());
    }

    #[test]
    fn test_sanitize_trims() {
        let vins = vec![" 1FTFW1ET5DFA12345 ".to_string()];
        let result = sanitize_vins(&vins, false).unwrap();
        assert_eq!(result, vec!["1FTFW1ET5DFA12345".to_string()]);
    }

    #[test]
    fn test_parse_vins_param() {
        let parsed = parse_vins_param("AAA,BBB, CCC ,");
        assert_eq!(parsed, vec!["AAA", "BBB", "CCC"]);
    }
}
