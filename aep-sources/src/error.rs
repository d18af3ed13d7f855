//! Types d'erreurs pour le crate aep-sources

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture des fichiers sources
#[derive(Debug, Error)]
pub enum SourceError {
    /// Erreur d'I/O lors de la lecture d'un fichier source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur du lecteur CSV
    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    /// Classeur Excel illisible ou feuille manquante
    #[error("Workbook error in {file}: {reason}")]
    Workbook { file: String, reason: String },

    /// Colonne attendue absente d'un classeur
    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { column: String, file: String },

    /// Document GeoJSON invalide
    #[error("Invalid GeoJSON in {file}: {reason}")]
    InvalidGeoJson { file: String, reason: String },

    /// Date invalide (forme attendue: AAAA-MM-JJ)
    #[error("Invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },
}

impl SourceError {
    /// Crée une erreur de classeur avec contexte
    pub fn workbook(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Workbook {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur GeoJSON avec contexte
    pub fn invalid_geojson(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeoJson {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
