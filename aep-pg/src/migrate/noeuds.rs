//! Migration des noeuds de consommation depuis le GeoJSON de points
//!
//! Les points arrivent en WGS84 et sont reprojetés en base vers le SRID
//! planaire cible.

use std::path::Path;

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use geo::Geometry;
use tracing::{error, info, warn};

use aep_sources::boundaries::read_feature_collection;
use aep_sources::normalize::truncate;

use crate::report::EntityStats;
use crate::store::geometry::to_ewkt;
use crate::store::TARGET_SRID;

/// SRID des coordonnées du fichier source
const SOURCE_SRID: u32 = 4326;

/// Migre le fichier GeoJSON des noeuds vers `noeud_consommation`
pub async fn run(target: &Pool, file: &Path) -> Result<EntityStats> {
    info!("Début de la migration des noeuds de consommation depuis GeoJSON");

    let features = read_feature_collection(file)?;

    let mut stats = EntityStats::default();
    stats.total = features.len();

    if features.is_empty() {
        warn!("Aucune donnée à migrer dans le fichier GeoJSON");
        return Ok(stats);
    }

    let mut client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let mut tx = crate::store::pool::begin_transaction(&mut client)
        .await
        .context("Failed to begin transaction")?;

    let stmt = tx
        .prepare(&format!(
            "INSERT INTO noeud_consommation (libelle, troncon, geom) \
             VALUES ($1, $2, ST_Transform(ST_GeomFromEWKT($3), {})) \
             RETURNING id_noeud_cons",
            TARGET_SRID
        ))
        .await
        .context("Failed to prepare noeud insert")?;

    for feature in &features {
        let Some(libelle) = feature.prop_str("libelle") else {
            warn!(feature = feature.index, "Feature ignorée (libelle manquant)");
            stats.skipped += 1;
            continue;
        };
        let libelle = truncate("libelle", &libelle, 50);

        let troncon = feature
            .prop_str("id_troncon")
            .map(|v| truncate("troncon", &v, 15));

        // La géométrie doit être un Point
        let point = match &feature.geometry {
            Some(geometry @ Geometry::Point(_)) => geometry,
            _ => {
                error!(
                    feature = feature.index,
                    libelle = libelle.as_str(),
                    "Géométrie manquante ou n'est pas un Point"
                );
                stats.errors += 1;
                continue;
            }
        };
        let ewkt = to_ewkt(point, SOURCE_SRID)?;

        let sp = tx
            .savepoint("noeud")
            .await
            .context("Failed to create savepoint")?;
        match sp.query_one(&stmt, &[&libelle, &troncon, &ewkt]).await {
            Ok(new_row) => {
                sp.commit().await.context("Failed to release savepoint")?;
                let new_id: i32 = new_row.get(0);
                info!(
                    id_noeud_cons = new_id,
                    libelle = libelle.as_str(),
                    "Noeud inséré"
                );
                stats.inserted += 1;
            }
            Err(e) => {
                let _ = sp.rollback().await;
                error!(feature = feature.index, error = %e, "Erreur sur la feature");
                stats.errors += 1;
            }
        }
    }

    tx.commit().await.context("Failed to commit")?;

    info!("Migration des noeuds terminée. {}", stats.summary());
    Ok(stats)
}
