//! # aep-sources
//!
//! Lecteurs des fichiers sources de la migration AEP: relevés CSV, rôles de
//! bornes Excel, limites et semis de points GeoJSON, plus la normalisation
//! des valeurs (nombres à virgule locale, dates, troncature, libellés
//! canoniques).
//!
//! Le crate est purement fichier → types: aucune connexion base de données,
//! aucune résolution d'entité. La réconciliation est faite par l'appelant.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aep_sources::readings::{collect_csv_files, read_readings};
//!
//! for file in collect_csv_files(Path::new("."))? {
//!     for row in read_readings(&file)? {
//!         // normaliser, résoudre, insérer
//!     }
//! }
//! ```

pub mod boundaries;
pub mod error;
pub mod excel;
pub mod normalize;
pub mod readings;
pub mod types;

pub use error::SourceError;
pub use types::{BorneRow, GeoFeature, RawReading, ReadingRow};
