//! Migration des quartiers depuis le fichier GeoJSON des limites
//!
//! `id_com` et `code_quartier` sont obligatoires (cible NOT NULL). Une
//! erreur de base de données interrompt l'unité: les limites de quartiers
//! conditionnent tout le rattachement spatial en aval, on ne continue pas
//! sur un référentiel douteux.

use std::path::Path;

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{error, info};

use aep_sources::boundaries::read_feature_collection;
use aep_sources::normalize::{parse_decimal, parse_integer, truncate};

use crate::report::EntityStats;
use crate::store::geometry::to_ewkt;
use crate::store::TARGET_SRID;

/// Migre le fichier GeoJSON des quartiers vers la table `quartier`
pub async fn run(target: &Pool, file: &Path) -> Result<EntityStats> {
    info!("--- Début Migration: quartier depuis GeoJSON ---");

    let features = read_feature_collection(file)?;

    let mut client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let tx = crate::store::pool::begin_transaction(&mut client)
        .await
        .context("Failed to begin transaction")?;

    let stmt = tx
        .prepare(
            "INSERT INTO quartier (id_com, code_quartier, lib_quartier, area_km2, \
             nb_habitant, geom) \
             VALUES ($1, $2, $3, $4::float8, $5, ST_Multi(ST_GeomFromEWKT($6))) \
             RETURNING id_quartier",
        )
        .await
        .context("Failed to prepare quartier insert")?;

    let mut stats = EntityStats::default();

    for feature in &features {
        stats.total += 1;
        let feature_tag = feature
            .prop_str("code_quartier")
            .unwrap_or_else(|| format!("feature_{}", feature.index));

        let Some(id_com) = feature.prop_i32("id_com") else {
            error!(feature = feature_tag.as_str(), "'id_com' est NULL, ligne ignorée");
            stats.errors += 1;
            continue;
        };

        let Some(code_quartier) = feature.prop_str("code_quartier") else {
            error!(id_com, "'code_quartier' est NULL, ligne ignorée");
            stats.errors += 1;
            continue;
        };
        let code_quartier = truncate("code_quartier", &code_quartier, 50);

        let lib_quartier = feature
            .prop_str("lib_quartier")
            .map(|v| truncate("lib_quartier", &v, 50));
        let area_km2 = feature
            .prop_str("area_km2")
            .and_then(|v| parse_decimal(&v));
        let nb_habitant = feature
            .prop_str("nb_habitant")
            .and_then(|v| parse_integer(&v));

        let Some(geometry) = &feature.geometry else {
            error!(feature = feature_tag.as_str(), "Géométrie manquante, ligne ignorée");
            stats.errors += 1;
            continue;
        };
        let ewkt = to_ewkt(geometry, TARGET_SRID)?;

        // Toute erreur SQL est fatale pour l'unité: rollback implicite et remontée
        let new_row = tx
            .query_one(
                &stmt,
                &[
                    &id_com,
                    &code_quartier,
                    &lib_quartier,
                    &area_km2,
                    &nb_habitant,
                    &ewkt,
                ],
            )
            .await
            .with_context(|| format!("Insertion de la feature '{}' échouée", feature_tag))?;

        let new_id: i32 = new_row.get(0);
        info!(
            code_quartier = code_quartier.as_str(),
            id_quartier = new_id,
            "Quartier inséré"
        );
        stats.inserted += 1;
    }

    tx.commit().await.context("Failed to commit")?;

    info!("--- Fin Migration: quartier — {} ---", stats.summary());
    Ok(stats)
}
