//! Migration des communes depuis l'ancienne base relationnelle
//!
//! Particularité héritée: l'unité est tout-ou-rien. La moindre erreur
//! d'enregistrement annule la transaction entière, les statistiques sont
//! journalisées dans les deux cas.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{error, info, warn};

use aep_sources::normalize::truncate;

use crate::report::EntityStats;

/// Ligne source, déjà typée par la requête de sélection
struct SourceCommune {
    gid: i32,
    code_dist: Option<String>,
    code_com: Option<f64>,
    lib_com: Option<String>,
    cat_com: Option<String>,
    area_km2: Option<f64>,
    nom_maire: Option<String>,
    densite: Option<f64>,
    geom: Option<String>,
}

/// Migre la table `commune` de la base source vers la base cible
pub async fn run(source: &Pool, target: &Pool) -> Result<EntityStats> {
    info!("--- Début Migration: commune ---");

    let source_client = source
        .get()
        .await
        .context("Failed to get source connection")?;

    let rows = source_client
        .query(
            "SELECT gid, cod_dist, cod_com::float8, lib_com, cat_com, \
             area_km2::float8, nom_maire, densite::float8, ST_AsGeoJSON(geom) \
             FROM commune ORDER BY gid",
            &[],
        )
        .await
        .context("Failed to read source commune table")?;

    let communes: Vec<SourceCommune> = rows
        .iter()
        .map(|row| SourceCommune {
            gid: row.get(0),
            code_dist: row.get(1),
            code_com: row.get(2),
            lib_com: row.get(3),
            cat_com: row.get(4),
            area_km2: row.get(5),
            nom_maire: row.get(6),
            densite: row.get(7),
            geom: row.get(8),
        })
        .collect();

    info!(rows = communes.len(), "Lignes trouvées dans la base source");

    let mut target_client = target
        .get()
        .await
        .context("Failed to get target connection")?;
    let mut tx = crate::store::pool::begin_transaction(&mut target_client)
        .await
        .context("Failed to begin transaction")?;

    let stmt = tx
        .prepare(
            "INSERT INTO commune (code_dist, code_com, lib_com, cat_com, area_km2, \
             nom_maire, nb_habitant, geom) \
             VALUES ($1, $2, $3, $4, $5::float8, $6, $7, \
             ST_Multi(ST_SetSRID(ST_GeomFromGeoJSON($8), 29702))) \
             RETURNING id_com",
        )
        .await
        .context("Failed to prepare commune insert")?;

    let mut stats = EntityStats::default();

    for row in &communes {
        stats.total += 1;

        // code_com est NOT NULL dans la cible
        let Some(code_com_raw) = row.code_com else {
            error!(gid = row.gid, "'cod_com' est NULL, ligne ignorée (cible NOT NULL)");
            stats.errors += 1;
            continue;
        };
        let code_com = truncate("code_com", &render_code(code_com_raw), 10);

        let code_dist = row
            .code_dist
            .as_deref()
            .map(|v| truncate("code_dist", v, 20));
        let lib_com = row.lib_com.as_deref().map(|v| truncate("lib_com", v, 50));
        let cat_com = row.cat_com.as_deref().map(|v| truncate("cat_com", v, 30));
        let nom_maire = row
            .nom_maire
            .as_deref()
            .map(|v| truncate("nom_maire", v, 50));
        let nb_habitant = row.densite.map(|d| d.trunc() as i32);

        let sp = tx
            .savepoint("commune")
            .await
            .context("Failed to create savepoint")?;
        let inserted = sp
            .query_one(
                &stmt,
                &[
                    &code_dist,
                    &code_com,
                    &lib_com,
                    &cat_com,
                    &row.area_km2,
                    &nom_maire,
                    &nb_habitant,
                    &row.geom,
                ],
            )
            .await;

        match inserted {
            Ok(new_row) => {
                sp.commit().await.context("Failed to release savepoint")?;
                let new_id: i32 = new_row.get(0);
                info!(
                    gid = row.gid,
                    code_com = code_com.as_str(),
                    id_com = new_id,
                    "Commune insérée"
                );
                stats.inserted += 1;
            }
            Err(e) => {
                let _ = sp.rollback().await;
                error!(gid = row.gid, error = %e, "Erreur lors de l'insertion de la commune");
                stats.errors += 1;
            }
        }
    }

    if stats.errors == 0 {
        tx.commit().await.context("Failed to commit")?;
        info!("Transaction validée (commit)");
    } else {
        tx.rollback().await.context("Failed to rollback")?;
        warn!(
            errors = stats.errors,
            "Transaction annulée (rollback): des erreurs se sont produites"
        );
    }

    info!("--- Fin Migration: commune — {} ---", stats.summary());
    Ok(stats)
}

/// Rend un code numérique source sans partie décimale parasite
fn render_code(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_code_drops_trailing_zero() {
        assert_eq!(render_code(1203.0), "1203");
        assert_eq!(render_code(12.5), "12.5");
    }
}
