//! Chargement par lots des relevés CSV
//!
//! L'unité d'atomicité est le fichier source: tous les enregistrements
//! acceptés d'un fichier sont commités ensemble; une erreur irrécupérable au
//! niveau du fichier annule tout le travail en attente et le job continue
//! avec le fichier suivant. Les échecs au niveau de l'enregistrement
//! (forme, valeur, résolution, doublon) sont des issues comptées, jamais des
//! exceptions.
//!
//! La classification d'un enregistrement est une fonction pure qui retourne
//! une issue typée; l'orchestrateur se contente de compter et de continuer.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use deadpool_postgres::Pool;
use tokio_postgres::Statement;
use tracing::{debug, error, info, warn};

use aep_sources::normalize::{csv_date_shape_ok, parse_decimal, parse_strict_date};
use aep_sources::readings::{collect_csv_files, read_readings};
use aep_sources::types::ReadingRow;

use crate::config::AliasMap;
use crate::recon::{DuplicateGuard, EntityKind, EntityResolver};
use crate::report::{FileStats, RunStats};

/// Règle de validation des dates d'une source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMode {
    /// Forme `AAAA-MM-JJ` exigée (longueur 10, deux tirets)
    Shape,
    /// Parsing strict `%Y-%m-%d`
    Strict,
}

/// Paramètres d'une table de faits (relevés)
#[derive(Debug, Clone, Copy)]
pub struct FactSpec {
    /// Table cible
    pub fact_table: &'static str,
    /// Colonne de clé étrangère vers l'entité propriétaire
    pub owner_column: &'static str,
    /// Famille d'entités pour la résolution de l'identifiant
    pub owner_kind: EntityKind,
    /// Règle de validation des dates
    pub date_mode: DateMode,
}

/// Relevés d'eau brute, rattachés aux captages par nom
pub const EAU_BRUTE: FactSpec = FactSpec {
    fact_table: "eau_brute",
    owner_column: "id_capt",
    owner_kind: EntityKind::Captage,
    date_mode: DateMode::Shape,
};

/// Relevés d'eau traitée, rattachés aux stations par nom
pub const EAU_TRAITE: FactSpec = FactSpec {
    fact_table: "eau_traite",
    owner_column: "id_station",
    owner_kind: EntityKind::Station,
    date_mode: DateMode::Shape,
};

/// Relevés d'eau distribuée, rattachés aux bornes par référence
pub const EAU_DISTRIBUE: FactSpec = FactSpec {
    fact_table: "eau_distribue",
    owner_column: "id_point_dist",
    owner_kind: EntityKind::Borne,
    date_mode: DateMode::Strict,
};

impl FactSpec {
    /// Ordre INSERT paramétré de la table de faits
    ///
    /// La quantité est liée en float8 puis convertie par la base vers la
    /// colonne NUMERIC.
    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (quantite, date, {}) VALUES ($1::float8, $2, $3)",
            self.fact_table, self.owner_column
        )
    }
}

/// Relevé prêt à insérer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingReading {
    pub quantity: Option<f64>,
    pub date: Option<NaiveDate>,
    pub owner: i32,
}

/// Issue d'un enregistrement, une et une seule par ligne source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordOutcome {
    /// Nombre de colonnes inattendu
    Malformed,
    /// Quantité et date toutes deux vides
    SkippedEmpty,
    /// Quantité présente mais inconvertible
    InvalidQuantity,
    /// Date présente mais de forme invalide
    InvalidDate,
    /// Identifiant propriétaire absent
    MissingIdentifier,
    /// Identifiant non résolu vers une ligne canonique
    EntityNotFound,
    /// Couple (date, entité) déjà présent
    Duplicate,
    /// Enregistrement accepté
    Insert(PendingReading),
}

/// Issue + constats de normalisation (valeurs absentes stockées en NULL)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordDecision {
    pub outcome: RecordOutcome,
    pub null_quantity: bool,
    pub null_date: bool,
}

impl RecordDecision {
    fn plain(outcome: RecordOutcome) -> Self {
        Self {
            outcome,
            null_quantity: false,
            null_date: false,
        }
    }
}

/// Classifie un enregistrement sans effet de bord
pub fn classify(
    row: &ReadingRow,
    spec: &FactSpec,
    resolver: &EntityResolver,
    guard: &DuplicateGuard,
) -> RecordDecision {
    let raw = match row {
        ReadingRow::Malformed { .. } => return RecordDecision::plain(RecordOutcome::Malformed),
        ReadingRow::Record(raw) => raw,
    };

    if raw.quantity.is_empty() && raw.date.is_empty() {
        return RecordDecision::plain(RecordOutcome::SkippedEmpty);
    }

    let mut decision = RecordDecision::plain(RecordOutcome::Malformed);

    let quantity = if raw.quantity.is_empty() {
        decision.null_quantity = true;
        None
    } else {
        match parse_decimal(&raw.quantity) {
            Some(q) => Some(q),
            None => {
                decision.outcome = RecordOutcome::InvalidQuantity;
                return decision;
            }
        }
    };

    let date = if raw.date.is_empty() {
        decision.null_date = true;
        None
    } else {
        let parsed = match spec.date_mode {
            DateMode::Shape if !csv_date_shape_ok(&raw.date) => None,
            DateMode::Shape | DateMode::Strict => parse_strict_date(&raw.date).ok(),
        };
        match parsed {
            Some(d) => Some(d),
            None => {
                decision.outcome = RecordOutcome::InvalidDate;
                return decision;
            }
        }
    };

    if raw.identifier.is_empty() {
        decision.outcome = RecordOutcome::MissingIdentifier;
        return decision;
    }

    let Some(owner) = resolver.resolve(&raw.identifier) else {
        decision.outcome = RecordOutcome::EntityNotFound;
        return decision;
    };

    if guard.contains(date, owner) {
        decision.outcome = RecordOutcome::Duplicate;
        return decision;
    }

    decision.outcome = RecordOutcome::Insert(PendingReading {
        quantity,
        date,
        owner,
    });
    decision
}

/// Exécute un job de migration de relevés sur tous les CSV d'un dossier
pub async fn run_readings_job(
    pool: &Pool,
    spec: &FactSpec,
    dir: &Path,
    aliases: AliasMap,
) -> Result<RunStats> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;

    let resolver = EntityResolver::load(&client, spec.owner_kind, aliases).await?;
    let mut guard = DuplicateGuard::load(&client, spec.fact_table, spec.owner_column).await?;
    drop(client);

    let files = collect_csv_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "Aucun fichier CSV à traiter");
    }

    let mut run = RunStats::default();

    for file in &files {
        info!(file = %file.display(), table = spec.fact_table, "Traitement du fichier");

        match process_file(pool, spec, &resolver, &mut guard, file).await {
            Ok(stats) => {
                guard.commit_pending();
                info!(file = %file.display(), "Fichier traité. {}", stats.summary());
                run.record_file(&stats);
            }
            Err(e) => {
                guard.discard_pending();
                error!(file = %file.display(), error = %e, "Échec traitement fichier");
                run.record_file_failure();
            }
        }
    }

    info!(
        table = spec.fact_table,
        "Migration terminée. {}",
        run.summary()
    );
    Ok(run)
}

/// Traite un fichier dans une transaction unique
async fn process_file(
    pool: &Pool,
    spec: &FactSpec,
    resolver: &EntityResolver,
    guard: &mut DuplicateGuard,
    path: &Path,
) -> Result<FileStats> {
    let rows = read_readings(path)?;

    let mut client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    let mut tx = crate::store::pool::begin_transaction(&mut client)
        .await
        .context("Failed to begin file transaction")?;

    let insert_sql = spec.insert_sql();
    let stmt = tx
        .prepare(&insert_sql)
        .await
        .context("Failed to prepare insert")?;

    let mut stats = FileStats::default();

    for row in &rows {
        let decision = classify(row, spec, resolver, guard);
        let line = match row {
            ReadingRow::Record(r) => r.line,
            ReadingRow::Malformed { line } => *line,
        };

        match decision.outcome {
            RecordOutcome::Malformed => {
                stats.record_error();
                warn!(line, "Format invalide (attendu: quantite,date,identifiant)");
                continue;
            }
            RecordOutcome::SkippedEmpty => {
                stats.record_skipped_empty();
                continue;
            }
            _ => {}
        }

        stats.count_record();
        if decision.null_quantity {
            stats.note_null_quantity();
        }
        if decision.null_date {
            stats.note_null_date();
        }

        let raw = match row {
            ReadingRow::Record(r) => r,
            ReadingRow::Malformed { .. } => unreachable!("handled above"),
        };

        match decision.outcome {
            RecordOutcome::InvalidQuantity => {
                stats.record_error();
                warn!(line, value = raw.quantity.as_str(), "Quantité invalide");
            }
            RecordOutcome::InvalidDate => {
                stats.record_error();
                warn!(
                    line,
                    value = raw.date.as_str(),
                    "Date invalide (format attendu: AAAA-MM-JJ)"
                );
            }
            RecordOutcome::MissingIdentifier => {
                stats.record_error();
                warn!(line, "Identifiant propriétaire manquant");
            }
            RecordOutcome::EntityNotFound => {
                stats.record_entity_not_found();
                warn!(
                    line,
                    identifier = raw.identifier.as_str(),
                    kind = spec.owner_kind.label(),
                    "Entité non trouvée"
                );
            }
            RecordOutcome::Duplicate => {
                stats.record_duplicate();
                debug!(
                    line,
                    identifier = raw.identifier.as_str(),
                    "Doublon ignoré"
                );
            }
            RecordOutcome::Insert(pending) => {
                match insert_reading(&mut tx, &stmt, &pending).await {
                    Ok(()) => {
                        guard.mark(pending.date, pending.owner);
                        stats.record_success();
                    }
                    Err(e) => {
                        stats.record_error();
                        error!(
                            line,
                            raw = format!("{},{},{}", raw.quantity, raw.date, raw.identifier),
                            error = %e,
                            "Erreur traitement ligne"
                        );
                    }
                }
            }
            RecordOutcome::Malformed | RecordOutcome::SkippedEmpty => unreachable!("handled above"),
        }
    }

    tx.commit()
        .await
        .context("Failed to commit file transaction")?;

    Ok(stats)
}

/// Insère un relevé sous savepoint
///
/// Un échec d'insertion inattendu n'invalide que l'enregistrement, pas la
/// transaction du fichier.
async fn insert_reading(
    tx: &mut tokio_postgres::Transaction<'_>,
    stmt: &Statement,
    pending: &PendingReading,
) -> Result<()> {
    let sp = tx
        .savepoint("record")
        .await
        .context("Failed to create savepoint")?;

    match sp
        .execute(stmt, &[&pending.quantity, &pending.date, &pending.owner])
        .await
    {
        Ok(_) => {
            sp.commit().await.context("Failed to release savepoint")?;
            Ok(())
        }
        Err(e) => {
            let _ = sp.rollback().await;
            Err(e).context("Insert failed")
        }
    }
}
