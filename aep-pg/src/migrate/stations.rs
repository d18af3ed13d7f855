//! Migration des stations de traitement depuis l'ancienne base relationnelle

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{error, info, warn};

use aep_sources::normalize::{parse_digits, truncate};

use crate::recon::ZoneIndex;
use crate::report::EntityStats;
use crate::store::geometry::{from_geojson_str, to_ewkt};
use crate::store::TARGET_SRID;

/// Migre la table source `stationTraitement` vers `station_traitement`
pub async fn run(source: &Pool, target: &Pool) -> Result<EntityStats> {
    info!("Début migration station_traitement");

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
            "SELECT id, elevation::float8, decanteurs::float8, filtres::float8, \
             capacite, ST_AsGeoJSON(geom) \
             FROM \"stationTraitement\" WHERE geom IS NOT NULL ORDER BY id",
            &[],
        )
        .await
        .context("Failed to read source stationTraitement table")?;

    let mut stats = EntityStats::default();
    stats.total = rows.len();
    info!(total = stats.total, "Stations à migrer");

    let mut target_client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let mut tx = crate::store::pool::begin_transaction(&mut target_client)
        .await
        .context("Failed to begin transaction")?;

    let stmt = tx
        .prepare(
            "INSERT INTO station_traitement (libelle, elevation, decanteurs, filtres, \
             capacite, geom, id_quartier) \
             VALUES ($1, $2::float8, $3::float8, $4::float8, $5::float8, \
             ST_GeomFromEWKT($6), $7) \
             RETURNING id_station",
        )
        .await
        .context("Failed to prepare station insert")?;

    for row in &rows {
        let source_id: String = row.get(0);
        let elevation: Option<f64> = row.get(1);
        let decanteurs: Option<f64> = row.get(2);
        let filtres: Option<f64> = row.get(3);
        let capacite_raw: Option<String> = row.get(4);
        let geom_json: Option<String> = row.get(5);

        let Some(geom_json) = geom_json else {
            stats.skipped += 1;
            continue;
        };

        let geometry = match from_geojson_str(&geom_json) {
            Ok(g) => g,
            Err(e) => {
                error!(station = source_id.as_str(), error = %e, "Géométrie source illisible");
                stats.errors += 1;
                continue;
            }
        };

        let Some(quartier_id) = zones.locate(&geometry) else {
            warn!(station = source_id.as_str(), "Aucun quartier trouvé pour la station");
            stats.zone_not_found += 1;
            continue;
        };

        let libelle = truncate("libelle", &source_id, 50);
        let capacite = capacite_raw.as_deref().and_then(parse_digits);
        let ewkt = match to_ewkt(&geometry, TARGET_SRID) {
            Ok(e) => e,
            Err(e) => {
                error!(station = source_id.as_str(), error = %e, "Encodage EWKT impossible");
                stats.errors += 1;
                continue;
            }
        };

        let sp = tx
            .savepoint("station")
            .await
            .context("Failed to create savepoint")?;
        match sp
            .query_one(
                &stmt,
                &[
                    &libelle,
                    &elevation,
                    &decanteurs,
                    &filtres,
                    &capacite,
                    &ewkt,
                    &quartier_id,
                ],
            )
            .await
        {
            Ok(new_row) => {
                sp.commit().await.context("Failed to release savepoint")?;
                let new_id: i32 = new_row.get(0);
                info!(
                    station = source_id.as_str(),
                    id_station = new_id,
                    quartier = quartier_id,
                    "Station migrée"
                );
                stats.inserted += 1;
            }
            Err(e) => {
                let _ = sp.rollback().await;
                error!(station = source_id.as_str(), error = %e, "Erreur sur station");
                stats.errors += 1;
            }
        }
    }

    tx.commit().await.context("Failed to commit")?;
    info!("Migration station_traitement terminée. {}", stats.summary());
    Ok(stats)
}
