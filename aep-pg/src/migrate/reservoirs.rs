//! Migration des réservoirs depuis l'ancienne base relationnelle
//!
//! Le libellé est canonisé en majuscules (les liaisons réservoir-réservoir
//! le résolvent ensuite par nom); le volume est extrait de chaînes du type
//! `"500 m3"`.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{error, info, warn};

use aep_sources::normalize::{canonical_label, parse_volume_m3, truncate};

use crate::recon::ZoneIndex;
use crate::report::EntityStats;
use crate::store::geometry::{from_geojson_str, to_ewkt};
use crate::store::TARGET_SRID;

/// Migre la table source `Reservoir` vers `reservoir`
pub async fn run(source: &Pool, target: &Pool) -> Result<EntityStats> {
    info!("Début migration reservoir");

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
            "SELECT id_reservoir, capacite, ST_AsGeoJSON(geom) \
             FROM \"Reservoir\" WHERE geom IS NOT NULL ORDER BY id_reservoir",
            &[],
        )
        .await
        .context("Failed to read source Reservoir table")?;

    let mut stats = EntityStats::default();
    stats.total = rows.len();
    info!(total = stats.total, "Réservoirs à migrer");

    let mut target_client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let mut tx = crate::store::pool::begin_transaction(&mut target_client)
        .await
        .context("Failed to begin transaction")?;

    let stmt = tx
        .prepare(
            "INSERT INTO reservoir (libelle, materiel, volume_m3, geom, id_quartier) \
             VALUES ($1, NULL, $2::float8, ST_GeomFromEWKT($3), $4) \
             RETURNING id_reservoir",
        )
        .await
        .context("Failed to prepare reservoir insert")?;

    for row in &rows {
        let source_id: String = row.get(0);
        let capacite: Option<String> = row.get(1);
        let geom_json: Option<String> = row.get(2);

        let Some(geom_json) = geom_json else {
            stats.skipped += 1;
            continue;
        };

        let geometry = match from_geojson_str(&geom_json) {
            Ok(g) => g,
            Err(e) => {
                error!(reservoir = source_id.as_str(), error = %e, "Géométrie source illisible");
                stats.errors += 1;
                continue;
            }
        };

        let Some(quartier_id) = zones.locate(&geometry) else {
            warn!(reservoir = source_id.as_str(), "Aucun quartier trouvé pour le réservoir");
            stats.zone_not_found += 1;
            continue;
        };

        let libelle = canonical_label(&source_id).map(|l| truncate("libelle", &l, 50));
        let volume_m3 = capacite.as_deref().and_then(parse_volume_m3);
        let ewkt = match to_ewkt(&geometry, TARGET_SRID) {
            Ok(e) => e,
            Err(e) => {
                error!(reservoir = source_id.as_str(), error = %e, "Encodage EWKT impossible");
                stats.errors += 1;
                continue;
            }
        };

        let sp = tx
            .savepoint("reservoir")
            .await
            .context("Failed to create savepoint")?;
        match sp
            .query_one(&stmt, &[&libelle, &volume_m3, &ewkt, &quartier_id])
            .await
        {
            Ok(new_row) => {
                sp.commit().await.context("Failed to release savepoint")?;
                let new_id: i32 = new_row.get(0);
                info!(
                    reservoir = source_id.as_str(),
                    id_reservoir = new_id,
                    quartier = quartier_id,
                    volume = ?volume_m3,
                    "Réservoir migré"
                );
                stats.inserted += 1;
            }
            Err(e) => {
                let _ = sp.rollback().await;
                error!(reservoir = source_id.as_str(), error = %e, "Erreur sur réservoir");
                stats.errors += 1;
            }
        }
    }

    tx.commit().await.context("Failed to commit")?;
    info!("Migration reservoir terminée. {}", stats.summary());
    Ok(stats)
}
