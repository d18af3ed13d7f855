//! Migration des points de distribution depuis les rôles de bornes Excel
//!
//! Deux sources se combinent: les rôles de bornes (une ligne par borne) et
//! le classeur de correspondance borne → tronçon, découvert par reniflage
//! des en-têtes dans le même dossier. Le quartier est résolu par nom
//! (préfixe `FKT `), le noeud de consommation via le tronçon mappé; les
//! deux rattachements sont facultatifs, la référence de borne ne l'est pas.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{error, info, warn};

use aep_sources::excel::{collect_workbooks, find_mapping_workbook, read_borne_roll, read_troncon_mapping};
use aep_sources::normalize::truncate;
use aep_sources::types::BorneRow;

use crate::config::AliasMap;
use crate::recon::{EntityKind, EntityResolver};
use crate::report::EntityStats;

/// Valeurs admises de l'énumération `type_point_distr`
const VALID_TYPES: [&str; 3] = [
    "BORNE FONTAINE",
    "BORNE PARTICULIER",
    "BORNE INSTITUT PUBLIQUE",
];

/// Type retenu à défaut d'une valeur reconnue
const DEFAULT_TYPE: &str = "BORNE PARTICULIER";

/// Importe tous les rôles de bornes d'un dossier
pub async fn run(target: &Pool, dir: &Path) -> Result<EntityStats> {
    info!(dir = %dir.display(), "Début de l'import des points de distribution");

    let mapping_file = find_mapping_workbook(dir)?;
    let mapping = match &mapping_file {
        Some(path) => {
            info!(file = %path.display(), "Lecture du fichier de mapping");
            read_troncon_mapping(path)?
        }
        None => {
            warn!("Aucun fichier de mapping trouvé dans le répertoire");
            HashMap::new()
        }
    };

    let client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let quartiers = EntityResolver::load(&client, EntityKind::Quartier, AliasMap::default()).await?;
    let troncons = EntityResolver::load(&client, EntityKind::Troncon, AliasMap::default()).await?;
    drop(client);

    let workbooks: Vec<PathBuf> = collect_workbooks(dir)?
        .into_iter()
        .filter(|p| Some(p) != mapping_file.as_ref())
        .collect();

    let mut global = EntityStats::default();

    for workbook in &workbooks {
        info!(file = %workbook.display(), "Début du traitement du fichier");

        match process_roll(target, workbook, &mapping, &quartiers, &troncons).await {
            Ok(stats) => {
                info!(file = %workbook.display(), "Fichier traité. {}", stats.summary());
                global.absorb(&stats);
            }
            Err(e) => {
                error!(file = %workbook.display(), error = %e, "Échec du traitement du fichier");
                global.errors += 1;
            }
        }
    }

    info!("Import global terminé. {}", global.summary());
    Ok(global)
}

/// Traite un rôle de bornes dans une transaction unique
async fn process_roll(
    target: &Pool,
    workbook: &Path,
    mapping: &HashMap<String, String>,
    quartiers: &EntityResolver,
    troncons: &EntityResolver,
) -> Result<EntityStats> {
    let rows = read_borne_roll(workbook)?;

    let mut stats = EntityStats::default();
    stats.total = rows.len();
    info!(
        file = %workbook.display(),
        rows = rows.len(),
        "Enregistrements trouvés"
    );

    let mut client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let mut tx = crate::store::pool::begin_transaction(&mut client)
        .await
        .context("Failed to begin transaction")?;

    let stmt = tx
        .prepare(
            "INSERT INTO point_de_distribution (type, geom, ref_borne, population, \
             id_quartier, id_noeud_cons) \
             VALUES ($1::type_point_distr, NULL, $2, NULL, $3, $4)",
        )
        .await
        .context("Failed to prepare borne insert")?;

    for row in &rows {
        let Some(ref_borne) = row.ref_borne.as_deref() else {
            warn!(line = row.row, "Ref borne manquante, ligne ignorée");
            stats.skipped += 1;
            continue;
        };
        let ref_borne = truncate("ref_borne", ref_borne, 15);

        // Quartier: rattachement facultatif, absence comptée
        let id_quartier = match row.quartier.as_deref() {
            Some(name) => match quartiers.resolve(name) {
                Some(id) => Some(id),
                None => {
                    warn!(line = row.row, quartier = name, "Quartier non trouvé dans la base");
                    stats.bump("quartier_not_found");
                    None
                }
            },
            None => None,
        };

        // Noeud de consommation via le mapping borne → tronçon
        let id_noeud_cons = match mapping.get(&ref_borne).or_else(|| {
            row.ref_borne.as_ref().and_then(|original| mapping.get(original))
        }) {
            Some(troncon) => match troncons.resolve(troncon) {
                Some(id) => {
                    stats.bump("noeud_cons_found");
                    Some(id)
                }
                None => {
                    stats.bump("noeud_cons_not_found");
                    None
                }
            },
            None => None,
        };

        let type_borne = normalize_type(row);

        let sp = tx
            .savepoint("borne")
            .await
            .context("Failed to create savepoint")?;
        match sp
            .execute(&stmt, &[&type_borne, &ref_borne, &id_quartier, &id_noeud_cons])
            .await
        {
            Ok(_) => {
                sp.commit().await.context("Failed to release savepoint")?;
                stats.inserted += 1;
            }
            Err(e) => {
                let _ = sp.rollback().await;
                error!(line = row.row, error = %e, "Erreur d'insertion de la borne");
                stats.errors += 1;
            }
        }
    }

    tx.commit().await.context("Failed to commit")?;
    Ok(stats)
}

/// Type de borne validé contre l'énumération, repli journalisé
fn normalize_type(row: &BorneRow) -> String {
    let raw = row
        .type_borne
        .as_deref()
        .map(|t| t.trim().to_uppercase())
        .unwrap_or_else(|| DEFAULT_TYPE.to_string());

    if VALID_TYPES.contains(&raw.as_str()) {
        raw
    } else {
        warn!(
            line = row.row,
            value = raw.as_str(),
            "Type inconnu, remplacé par 'BORNE PARTICULIER'"
        );
        DEFAULT_TYPE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with_type(t: Option<&str>) -> BorneRow {
        BorneRow {
            row: 2,
            ref_borne: Some("BF-001".to_string()),
            quartier: None,
            type_borne: t.map(str::to_string),
        }
    }

    #[test]
    fn test_normalize_type_accepts_enum_values() {
        assert_eq!(
            normalize_type(&row_with_type(Some("BORNE FONTAINE"))),
            "BORNE FONTAINE"
        );
        assert_eq!(
            normalize_type(&row_with_type(Some("borne institut publique"))),
            "BORNE INSTITUT PUBLIQUE"
        );
    }

    #[test]
    fn test_normalize_type_falls_back_on_unknown() {
        assert_eq!(normalize_type(&row_with_type(Some("ROBINET"))), DEFAULT_TYPE);
        assert_eq!(normalize_type(&row_with_type(None)), DEFAULT_TYPE);
    }
}
