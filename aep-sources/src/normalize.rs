//! Normalisation des valeurs sources
//!
//! Les fichiers d'origine mélangent séparateurs décimaux (`12,5` / `12.5`),
//! unités collées aux nombres (`500 m3`), libellés à casse libre et colonnes
//! cibles à largeur fixe. Tout passe par ici avant insertion.

use chrono::NaiveDate;
use tracing::warn;

use crate::error::SourceError;

/// Parse une valeur décimale tolérante (virgule ou point, caractères parasites)
///
/// Vide ou inconvertible → `None` (jamais zéro). L'échec de conversion est
/// journalisé en warning, il n'interrompt pas l'enregistrement.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed
        .replace(' ', "")
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }

    match cleaned.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(value = raw, "Valeur numérique inconvertible, mise à NULL");
            None
        }
    }
}

/// Parse un entier (partie décimale tronquée)
pub fn parse_integer(raw: &str) -> Option<i32> {
    parse_decimal(raw).map(|v| v.trunc() as i32)
}

/// Parse un nombre en ne gardant que chiffres et point (`"cap. 120.5"` → 120.5)
pub fn parse_digits(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(value = raw, "Capacité inconvertible, mise à NULL");
            None
        }
    }
}

/// Parse un volume exprimé avec suffixe `m3` (`"500 m3"` → 500.0)
pub fn parse_volume_m3(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_unit = trimmed
        .strip_suffix("m3")
        .or_else(|| trimmed.strip_suffix("M3"))
        .unwrap_or(trimmed)
        .trim();

    match without_unit.replace(',', ".").parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(value = raw, "Volume inconvertible, mis à NULL");
            None
        }
    }
}

/// Vérifie la forme `AAAA-MM-JJ` des dates CSV (longueur 10, deux tirets)
pub fn csv_date_shape_ok(raw: &str) -> bool {
    raw.len() == 10 && raw.matches('-').count() == 2
}

/// Parse une date CSV: forme `AAAA-MM-JJ` exigée, toute autre forme est une
/// erreur de validation pour l'enregistrement (pas un NULL silencieux)
pub fn parse_csv_date(raw: &str) -> Result<NaiveDate, SourceError> {
    if !csv_date_shape_ok(raw) {
        return Err(SourceError::InvalidDate {
            value: raw.to_string(),
        });
    }
    parse_strict_date(raw)
}

/// Parse une date au format strict `%Y-%m-%d`
pub fn parse_strict_date(raw: &str) -> Result<NaiveDate, SourceError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| SourceError::InvalidDate {
        value: raw.to_string(),
    })
}

/// Tronque une valeur à la largeur de la colonne cible
///
/// La troncature est journalisée avec le champ, la valeur d'origine et la
/// valeur tronquée; elle ne rejette jamais l'enregistrement.
pub fn truncate(field: &str, value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    let truncated: String = value.chars().take(max_chars).collect();
    warn!(
        field = field,
        original = value,
        truncated = truncated.as_str(),
        "Valeur tronquée à la largeur de la colonne"
    );
    truncated
}

/// Forme canonique d'un libellé: majuscules, espaces internes réduits
///
/// Utilisée pour les noms de captages et de réservoirs avant stockage, afin
/// que la résolution ultérieure soit insensible à la casse.
pub fn canonical_label(raw: &str) -> Option<String> {
    let formatted = raw
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    (!formatted.is_empty()).then_some(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_comma_equals_dot() {
        assert_eq!(parse_decimal("12,5"), parse_decimal("12.5"));
        assert_eq!(parse_decimal("12,5"), Some(12.5));
    }

    #[test]
    fn test_parse_decimal_strips_junk() {
        assert_eq!(parse_decimal(" 1 234,5 "), Some(1234.5));
        assert_eq!(parse_decimal("12.5%"), Some(12.5));
        assert_eq!(parse_decimal("-3,2"), Some(-3.2));
    }

    #[test]
    fn test_parse_decimal_empty_is_none_not_zero() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("   "), None);
        assert_eq!(parse_decimal("-"), None);
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn test_parse_integer_truncates() {
        assert_eq!(parse_integer("1523,9"), Some(1523));
        assert_eq!(parse_integer("12"), Some(12));
        assert_eq!(parse_integer(""), None);
    }

    #[test]
    fn test_parse_digits() {
        assert_eq!(parse_digits("cap. 120.5"), Some(120.5));
        assert_eq!(parse_digits("1200"), Some(1200.0));
        assert_eq!(parse_digits(""), None);
        assert_eq!(parse_digits("n/a"), None);
    }

    #[test]
    fn test_parse_volume_m3() {
        assert_eq!(parse_volume_m3("500 m3"), Some(500.0));
        assert_eq!(parse_volume_m3("500m3"), Some(500.0));
        assert_eq!(parse_volume_m3("120,5 m3"), Some(120.5));
        assert_eq!(parse_volume_m3("500"), Some(500.0));
        assert_eq!(parse_volume_m3("beaucoup"), None);
        assert_eq!(parse_volume_m3(""), None);
    }

    #[test]
    fn test_csv_date_shape() {
        assert!(csv_date_shape_ok("2023-04-01"));
        assert!(!csv_date_shape_ok("2023-4-1"));
        assert!(!csv_date_shape_ok("01/04/2023"));
        assert!(!csv_date_shape_ok("2023-04-01 "));
        assert!(!csv_date_shape_ok(""));
    }

    #[test]
    fn test_parse_csv_date_identity_on_valid_shape() {
        let d = parse_csv_date("2023-04-01").unwrap();
        assert_eq!(d.to_string(), "2023-04-01");
    }

    #[test]
    fn test_parse_csv_date_rejects_other_shapes() {
        assert!(parse_csv_date("04-01-2023x").is_err());
        assert!(parse_csv_date("2023/04/01").is_err());
        assert!(parse_csv_date("2023-4-01").is_err());
    }

    #[test]
    fn test_parse_strict_date() {
        assert!(parse_strict_date("2023-04-01").is_ok());
        assert!(parse_strict_date("2023-13-01").is_err());
        assert!(parse_strict_date("hier").is_err());
    }

    #[test]
    fn test_truncate_preserves_prefix() {
        assert_eq!(truncate("lib_com", "COMMUNE URBAINE DE FIANARANTSOA I", 20), "COMMUNE URBAINE DE F");
        assert_eq!(truncate("lib_com", "court", 20), "court");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("libelle", "ÉÉÉÉ", 2), "ÉÉ");
    }

    #[test]
    fn test_canonical_label() {
        assert_eq!(
            canonical_label("  Barrage 1 -  Vatosola "),
            Some("BARRAGE 1 - VATOSOLA".to_string())
        );
        assert_eq!(canonical_label("rova"), Some("ROVA".to_string()));
        assert_eq!(canonical_label("   "), None);
        assert_eq!(canonical_label(""), None);
    }
}
