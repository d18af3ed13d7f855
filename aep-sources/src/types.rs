//! Types de données pour le crate aep-sources

use geo::Geometry;
use serde_json::{Map, Value};

/// Une ligne brute d'un fichier CSV de relevés (quantité, date, identifiant)
///
/// Les trois champs sont conservés tels quels (après trim), la normalisation
/// des valeurs est faite par l'appelant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    /// Numéro de ligne dans le fichier source (1-indexé)
    pub line: u64,

    /// Quantité brute (peut être vide)
    pub quantity: String,

    /// Date brute (peut être vide)
    pub date: String,

    /// Identifiant de l'entité propriétaire (nom de captage, de station,
    /// ou référence de borne selon le fichier)
    pub identifier: String,
}

/// Résultat de lecture d'une ligne CSV de relevés
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingRow {
    /// Ligne à trois colonnes, exploitable
    Record(RawReading),

    /// Ligne dont la forme ne correspond pas (nombre de colonnes != 3)
    Malformed { line: u64 },
}

/// Une ligne d'un classeur Excel de bornes de distribution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorneRow {
    /// Numéro de ligne dans la feuille (1-indexé, en-tête comprise)
    pub row: u32,

    /// Référence de la borne (colonne `Ref_borne`)
    pub ref_borne: Option<String>,

    /// Nom du quartier (colonne `Cartier`)
    pub quartier: Option<String>,

    /// Type de borne (colonne `Type`)
    pub type_borne: Option<String>,
}

/// Une feature d'une FeatureCollection GeoJSON source
#[derive(Debug, Clone)]
pub struct GeoFeature {
    /// Position de la feature dans la collection (0-indexé)
    pub index: usize,

    /// Géométrie convertie en types `geo` (None si absente du document)
    pub geometry: Option<Geometry<f64>>,

    /// Objet `properties` de la feature
    pub properties: Map<String, Value>,
}

impl GeoFeature {
    /// Valeur d'une propriété rendue en chaîne (chaînes et nombres)
    pub fn prop_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Value::Number(n) => Some(render_number(n)),
            _ => None,
        }
    }

    /// Valeur d'une propriété en entier (nombres et chaînes numériques)
    pub fn prop_i32(&self, key: &str) -> Option<i32> {
        match self.properties.get(key)? {
            Value::Number(n) => n.as_i64().map(|v| v as i32).or_else(|| {
                n.as_f64().map(|v| v.trunc() as i32)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Valeur brute d'une propriété
    pub fn prop_raw(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Rend un nombre JSON sans `.0` terminal (`1203.0` → `"1203"`)
fn render_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}
