//! # aep-pg
//!
//! Migration des données AEP (alimentation en eau potable) vers le schéma
//! harmonisé PostGIS: captage → traitement → réservoir → distribution.
//!
//! Le coeur du crate est le moteur de réconciliation ([`recon`]): résolution
//! des identifiants textuels saisis à la main contre les lignes canoniques
//! de la base cible, rattachement spatial des ouvrages à leur quartier, et
//! garde anti-doublons sur les relevés (date, entité).
//!
//! ## Usage CLI
//!
//! ```bash
//! # Créer le schéma cible
//! aep-pg init-schema
//!
//! # Charger les limites de quartiers puis les ouvrages
//! aep-pg quartiers --file quartier_rhm.geojson
//! aep-pg captages
//!
//! # Importer les relevés CSV du dossier courant
//! aep-pg eau-brute --dir .
//! ```

pub mod cli;
pub mod config;
pub mod loader;
pub mod migrate;
pub mod recon;
pub mod report;
pub mod store;

pub use config::AliasMap;
pub use report::{FileStats, RunStats};
pub use store::pool::{create_pool, DatabaseConfig};
