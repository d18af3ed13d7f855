//! Migration des captages depuis l'ancienne base relationnelle
//!
//! Le quartier propriétaire est déterminé par contenance spatiale de
//! l'emprise du captage; le libellé est canonisé en majuscules pour que les
//! relevés d'eau brute puissent le résoudre ensuite.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{debug, error, info, warn};

use aep_sources::normalize::{canonical_label, truncate};

use crate::recon::ZoneIndex;
use crate::report::EntityStats;
use crate::store::geometry::{from_geojson_str, to_ewkt};
use crate::store::TARGET_SRID;

/// Migre la table `captage` de la base source vers la base cible
pub async fn run(source: &Pool, target: &Pool) -> Result<EntityStats> {
    info!("Début migration captage");

    let target_lookup = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let zones = ZoneIndex::load(&target_lookup).await?;
    drop(target_lookup);

    let source_client = source
        .get()
        .await
        .context("Failed to get source connection")?;
    let rows = source_client
        .query(
            "SELECT gid, id_capt, type, ST_AsGeoJSON(geom) FROM captage \
             WHERE geom IS NOT NULL ORDER BY gid",
            &[],
        )
        .await
        .context("Failed to read source captage table")?;

    let mut stats = EntityStats::default();
    stats.total = rows.len();
    info!(total = stats.total, "Captages à migrer");

    let mut target_client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let mut tx = crate::store::pool::begin_transaction(&mut target_client)
        .await
        .context("Failed to begin transaction")?;

    let stmt = tx
        .prepare(
            "INSERT INTO captage (libelle_capt, type_capt, debit_capt, date_mes, geom, id_quartier) \
             VALUES ($1, $2, NULL, NULL, ST_Multi(ST_GeomFromEWKT($3)), $4) \
             RETURNING id_capt",
        )
        .await
        .context("Failed to prepare captage insert")?;

    for row in &rows {
        let gid: i32 = row.get(0);
        let source_label: Option<String> = row.get(1);
        let type_capt: Option<String> = row.get(2);
        let geom_json: Option<String> = row.get(3);

        let Some(geom_json) = geom_json else {
            stats.skipped += 1;
            continue;
        };

        let geometry = match from_geojson_str(&geom_json) {
            Ok(g) => g,
            Err(e) => {
                error!(gid, error = %e, "Géométrie source illisible");
                stats.errors += 1;
                continue;
            }
        };

        let Some(quartier_id) = zones.locate(&geometry) else {
            warn!(gid, "Aucun quartier ne contient le captage");
            stats.zone_not_found += 1;
            continue;
        };

        // Libellé canonique, repli sur un identifiant technique
        let raw_label = source_label
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("CAPT_{}", gid));
        let libelle = canonical_label(&raw_label)
            .map(|l| truncate("libelle_capt", &l, 50));
        debug!(gid, libelle = ?libelle, "Libellé transformé");

        let type_val = truncate("type_capt", type_capt.as_deref().unwrap_or(""), 60);
        let ewkt = match to_ewkt(&geometry, TARGET_SRID) {
            Ok(e) => e,
            Err(e) => {
                error!(gid, error = %e, "Encodage EWKT impossible");
                stats.errors += 1;
                continue;
            }
        };

        let sp = tx
            .savepoint("captage")
            .await
            .context("Failed to create savepoint")?;
        match sp
            .query_one(&stmt, &[&libelle, &type_val, &ewkt, &quartier_id])
            .await
        {
            Ok(new_row) => {
                sp.commit().await.context("Failed to release savepoint")?;
                let new_id: i32 = new_row.get(0);
                debug!(gid, id_capt = new_id, "Captage migré");
                stats.inserted += 1;
            }
            Err(e) => {
                let _ = sp.rollback().await;
                error!(gid, error = %e, "Erreur sur captage");
                stats.errors += 1;
            }
        }
    }

    tx.commit().await.context("Failed to commit")?;
    info!("Migration captage terminée. {}", stats.summary());
    Ok(stats)
}
