//! Résolution des identifiants textuels vers les lignes canoniques
//!
//! Les fichiers sources désignent les entités par des noms saisis à la main
//! (casse libre, espaces parasites, variantes d'écriture). La résolution se
//! fait sur un index chargé une fois depuis la base cible: les deux côtés
//! sont ramenés à la même forme canonique, et en cas de doublon de libellé
//! c'est la première ligne par ordre de stockage qui gagne — l'ambiguïté
//! n'est pas une erreur.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio_postgres::Client;
use tracing::info;

use aep_sources::normalize::canonical_label;

use crate::config::AliasMap;

/// Famille d'entités résolvables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Captage, par libellé canonique
    Captage,
    /// Station de traitement, par libellé canonique
    Station,
    /// Réservoir, par libellé canonique
    Reservoir,
    /// Point de distribution, par référence de borne exacte (après trim)
    Borne,
    /// Quartier, par libellé préfixé `FKT `, insensible à la casse
    Quartier,
    /// Noeud de consommation, par code tronçon avec variantes `A - B`/`A->B`
    Troncon,
}

impl EntityKind {
    /// Nom de la famille pour les journaux
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Captage => "captage",
            EntityKind::Station => "station_traitement",
            EntityKind::Reservoir => "reservoir",
            EntityKind::Borne => "point_de_distribution",
            EntityKind::Quartier => "quartier",
            EntityKind::Troncon => "noeud_consommation",
        }
    }

    /// Requête de chargement de l'index (id, nom), ordre de stockage
    fn load_query(&self) -> &'static str {
        match self {
            EntityKind::Captage => {
                "SELECT id_capt, libelle_capt FROM captage \
                 WHERE libelle_capt IS NOT NULL ORDER BY id_capt"
            }
            EntityKind::Station => {
                "SELECT id_station, libelle FROM station_traitement \
                 WHERE libelle IS NOT NULL ORDER BY id_station"
            }
            EntityKind::Reservoir => {
                "SELECT id_reservoir, libelle FROM reservoir \
                 WHERE libelle IS NOT NULL ORDER BY id_reservoir"
            }
            EntityKind::Borne => {
                "SELECT id_point_dist, ref_borne FROM point_de_distribution \
                 WHERE ref_borne IS NOT NULL ORDER BY id_point_dist"
            }
            EntityKind::Quartier => {
                "SELECT id_quartier, lib_quartier FROM quartier \
                 WHERE lib_quartier IS NOT NULL ORDER BY id_quartier"
            }
            EntityKind::Troncon => {
                "SELECT id_noeud_cons, troncon FROM noeud_consommation \
                 WHERE troncon IS NOT NULL ORDER BY id_noeud_cons"
            }
        }
    }

    /// Clé d'index pour un nom stocké en base
    fn index_key(&self, stored: &str) -> Option<String> {
        match self {
            EntityKind::Captage
            | EntityKind::Station
            | EntityKind::Reservoir
            | EntityKind::Quartier => canonical_label(stored),
            EntityKind::Borne | EntityKind::Troncon => {
                let trimmed = stored.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

/// Index nom canonique → id, première ligne gagnante
#[derive(Debug, Default)]
struct NameIndex {
    entries: HashMap<String, i32>,
}

impl NameIndex {
    fn insert_first(&mut self, key: String, id: i32) {
        self.entries.entry(key).or_insert(id);
    }

    fn get(&self, key: &str) -> Option<i32> {
        self.entries.get(key).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Résolveur d'identifiants pour une famille d'entités
#[derive(Debug)]
pub struct EntityResolver {
    kind: EntityKind,
    index: NameIndex,
    aliases: AliasMap,
}

impl EntityResolver {
    /// Charge l'index de résolution depuis la base cible
    pub async fn load(client: &Client, kind: EntityKind, aliases: AliasMap) -> Result<Self> {
        let rows = client
            .query(kind.load_query(), &[])
            .await
            .with_context(|| format!("Failed to load {} name index", kind.label()))?;

        let pairs = rows
            .iter()
            .map(|row| (row.get::<_, i32>(0), row.get::<_, String>(1)))
            .collect::<Vec<_>>();

        let resolver = Self::from_rows(kind, pairs, aliases);
        info!(
            kind = kind.label(),
            entries = resolver.len(),
            "Index de résolution chargé"
        );
        Ok(resolver)
    }

    /// Construit un résolveur depuis des paires (id, nom) en ordre de stockage
    pub fn from_rows(
        kind: EntityKind,
        rows: impl IntoIterator<Item = (i32, String)>,
        aliases: AliasMap,
    ) -> Self {
        let mut index = NameIndex::default();
        for (id, name) in rows {
            if let Some(key) = kind.index_key(&name) {
                index.insert_first(key, id);
            }
        }
        Self {
            kind,
            index,
            aliases,
        }
    }

    /// Nombre d'entrées de l'index
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Vrai si l'index est vide
    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }

    /// Résout un identifiant saisi vers l'id canonique
    ///
    /// Absent → `None`: l'appelant compte l'issue et saute l'enregistrement,
    /// la résolution ne fait jamais échouer le lot.
    pub fn resolve(&self, raw: &str) -> Option<i32> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match self.kind {
            EntityKind::Captage | EntityKind::Station | EntityKind::Reservoir => {
                let canon = canonical_label(raw)?;

                // Alias d'abord, repli sur le libellé saisi
                if let Some(preferred) = self.aliases.preferred(&canon) {
                    if let Some(id) = canonical_label(preferred)
                        .and_then(|key| self.index.get(&key))
                    {
                        return Some(id);
                    }
                }

                self.index.get(&canon)
            }
            EntityKind::Quartier => {
                let key = canonical_label(&format!("FKT {}", raw))?;
                self.index.get(&key)
            }
            EntityKind::Borne => self.index.get(raw),
            EntityKind::Troncon => self.resolve_troncon(raw),
        }
    }

    /// Résolution tronçon: forme fléchée d'abord, puis les deux sens
    fn resolve_troncon(&self, raw: &str) -> Option<i32> {
        let direct = raw.replace(" - ", "->");
        if let Some(id) = self.index.get(direct.trim()) {
            return Some(id);
        }

        if raw.contains(" - ") {
            let parts: Vec<&str> = raw.split(" - ").map(str::trim).collect();
            if parts.len() == 2 {
                for variant in [
                    format!("{}->{}", parts[0], parts[1]),
                    format!("{}->{}", parts[1], parts[0]),
                ] {
                    if let Some(id) = self.index.get(&variant) {
                        return Some(id);
                    }
                }
            }
        }

        None
    }
}
