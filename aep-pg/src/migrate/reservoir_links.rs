//! Remplissage des liaisons réservoir → réservoir
//!
//! La liste des liaisons vient de la configuration (preset embarqué ou
//! fichier JSON fourni); les extrémités sont résolues par libellé,
//! insensiblement à la casse et aux espaces. Une liaison déjà présente
//! n'est pas une erreur.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{error, info};

use crate::config::{AliasMap, ReservoirLink};
use crate::recon::{EntityKind, EntityResolver};
use crate::report::EntityStats;

/// Crée les liaisons configurées dans `reservoir_reservoir`
pub async fn run(target: &Pool, links: &[ReservoirLink], aliases: AliasMap) -> Result<EntityStats> {
    info!("Début du remplissage des relations réservoir-réservoir");

    let mut client = target
        .get()
        .await
        .context("Failed to get target connection")?;

    let resolver = EntityResolver::load(&client, EntityKind::Reservoir, aliases).await?;

    let mut tx = crate::store::pool::begin_transaction(&mut client)
        .await
        .context("Failed to begin transaction")?;

    let exists_stmt = tx
        .prepare(
            "SELECT 1 FROM reservoir_reservoir \
             WHERE id_reservoir_source = $1 AND id_reservoir_destination = $2",
        )
        .await
        .context("Failed to prepare existence check")?;
    let insert_stmt = tx
        .prepare(
            "INSERT INTO reservoir_reservoir (id_reservoir_source, id_reservoir_destination) \
             VALUES ($1, $2)",
        )
        .await
        .context("Failed to prepare link insert")?;

    let mut stats = EntityStats::default();
    stats.total = links.len();

    for link in links {
        let Some(source_id) = resolver.resolve(&link.source) else {
            error!(reservoir = link.source.as_str(), "Réservoir source non trouvé");
            stats.errors += 1;
            continue;
        };
        let Some(dest_id) = resolver.resolve(&link.destination) else {
            error!(
                reservoir = link.destination.as_str(),
                "Réservoir destination non trouvé"
            );
            stats.errors += 1;
            continue;
        };

        let already = tx
            .query_opt(&exists_stmt, &[&source_id, &dest_id])
            .await
            .context("Failed to check existing link")?
            .is_some();

        if already {
            info!(
                source = link.source.as_str(),
                destination = link.destination.as_str(),
                "Relation existe déjà"
            );
            stats.bump("already_present");
            continue;
        }

        let sp = tx
            .savepoint("link")
            .await
            .context("Failed to create savepoint")?;
        match sp.execute(&insert_stmt, &[&source_id, &dest_id]).await {
            Ok(_) => {
                sp.commit().await.context("Failed to release savepoint")?;
                info!(
                    source = format!("{}({})", link.source, source_id),
                    destination = format!("{}({})", link.destination, dest_id),
                    "Relation créée"
                );
                stats.inserted += 1;
            }
            Err(e) => {
                let _ = sp.rollback().await;
                error!(
                    source = link.source.as_str(),
                    destination = link.destination.as_str(),
                    error = %e,
                    "Erreur lors de la création de la relation"
                );
                stats.errors += 1;
            }
        }
    }

    tx.commit().await.context("Failed to commit")?;

    info!("Remplissage terminé. {}", stats.summary());
    Ok(stats)
}
