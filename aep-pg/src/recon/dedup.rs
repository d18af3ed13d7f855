//! Garde anti-doublons des relevés
//!
//! Un relevé est un doublon si un enregistrement partage exactement le
//! couple (date, entité propriétaire), quelle que soit la quantité: la
//! valeur arrivée plus tard est écartée, jamais fusionnée. La date absente
//! est une valeur de clé à part entière — deux relevés sans date pour la
//! même entité se dédoublonnent entre eux.
//!
//! Les couples existants sont préchargés depuis la table de faits; les
//! couples insérés pendant un fichier restent en attente et ne rejoignent
//! l'ensemble validé qu'au commit du fichier.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashSet;
use tokio_postgres::Client;
use tracing::info;

/// Clé d'unicité d'un relevé
pub type FactKey = (Option<NaiveDate>, i32);

/// Garde anti-doublons pour une table de faits
#[derive(Debug, Default)]
pub struct DuplicateGuard {
    committed: HashSet<FactKey>,
    pending: HashSet<FactKey>,
}

impl DuplicateGuard {
    /// Précharge les couples (date, entité) existants d'une table de faits
    pub async fn load(client: &Client, fact_table: &str, owner_column: &str) -> Result<Self> {
        let query = format!("SELECT date, {} FROM {}", owner_column, fact_table);
        let rows = client
            .query(&query, &[])
            .await
            .with_context(|| format!("Failed to load existing facts from {}", fact_table))?;

        let committed: HashSet<FactKey> = rows
            .iter()
            .map(|row| (row.get::<_, Option<NaiveDate>>(0), row.get::<_, i32>(1)))
            .collect();

        info!(
            table = fact_table,
            existing = committed.len(),
            "Couples (date, entité) existants chargés"
        );

        Ok(Self {
            committed,
            pending: HashSet::new(),
        })
    }

    /// Construit une garde depuis des couples déjà connus
    pub fn from_pairs(pairs: impl IntoIterator<Item = FactKey>) -> Self {
        Self {
            committed: pairs.into_iter().collect(),
            pending: HashSet::new(),
        }
    }

    /// Vrai si le couple est déjà présent (validé ou en attente)
    pub fn contains(&self, date: Option<NaiveDate>, owner: i32) -> bool {
        let key = (date, owner);
        self.committed.contains(&key) || self.pending.contains(&key)
    }

    /// Enregistre un couple inséré dans le fichier en cours
    pub fn mark(&mut self, date: Option<NaiveDate>, owner: i32) {
        self.pending.insert((date, owner));
    }

    /// Valide les couples du fichier (après commit de la transaction)
    pub fn commit_pending(&mut self) {
        self.committed.extend(self.pending.drain());
    }

    /// Abandonne les couples du fichier (après rollback)
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Nombre de couples validés
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    /// Vrai si aucun couple n'est connu
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.pending.is_empty()
    }
}
