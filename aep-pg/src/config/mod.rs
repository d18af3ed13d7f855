//! Configuration du système
//!
//! Les règles métier qui étaient éparpillées en dur dans les scripts
//! historiques (table d'alias de résolution, liste des liaisons entre
//! réservoirs) sont des documents JSON injectés: un preset embarqué par
//! défaut, remplaçable par un fichier fourni en ligne de commande.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use aep_sources::normalize::canonical_label;

/// Table d'alias de résolution: forme canonique saisie → libellé à chercher
/// en priorité
///
/// Exemple hérité: `VATOSOLA` → `BARRAGE 1 - VATOSOLA`. Si le libellé
/// préféré est introuvable, le résolveur retombe sur le libellé saisi.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AliasMap {
    #[serde(flatten)]
    entries: HashMap<String, String>,
}

impl AliasMap {
    /// Charge une table d'alias depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alias file: {}", path.display()))?;

        let map: Self =
            serde_json::from_str(&content).context("Failed to parse alias JSON")?;
        Ok(map.canonicalized())
    }

    /// Table d'alias par défaut (preset embarqué)
    pub fn default_preset() -> Result<Self> {
        let map: Self = serde_json::from_str(include_str!("presets/aliases.json"))
            .context("Failed to parse embedded alias preset")?;
        Ok(map.canonicalized())
    }

    /// Construit une table depuis des paires (entrée, libellé préféré)
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
        .canonicalized()
    }

    /// Libellé à chercher en priorité pour une entrée canonique
    pub fn preferred(&self, canonical: &str) -> Option<&str> {
        self.entries.get(canonical).map(String::as_str)
    }

    /// Nombre d'alias configurés
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Vrai si la table est vide
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-clé la table sur la forme canonique des entrées
    fn canonicalized(self) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .filter_map(|(k, v)| canonical_label(&k).map(|ck| (ck, v)))
                .collect(),
        }
    }
}

/// Une liaison orientée entre deux réservoirs, par libellés
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReservoirLink {
    pub source: String,
    pub destination: String,
}

/// Charge la liste des liaisons réservoir → réservoir
///
/// `path` absent → preset embarqué (la chaîne de transfert héritée).
pub fn load_reservoir_links(path: Option<&Path>) -> Result<Vec<ReservoirLink>> {
    let content = match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read links file: {}", p.display()))?,
        None => include_str!("presets/reservoir_links.json").to_string(),
    };

    serde_json::from_str(&content).context("Failed to parse reservoir links JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_has_inherited_alias() {
        let aliases = AliasMap::default_preset().unwrap();
        assert_eq!(
            aliases.preferred("VATOSOLA"),
            Some("BARRAGE 1 - VATOSOLA")
        );
    }

    #[test]
    fn test_alias_keys_are_canonicalized() {
        let aliases = AliasMap::from_entries([("  vatosola ", "BARRAGE 1 - VATOSOLA")]);
        assert_eq!(aliases.preferred("VATOSOLA"), Some("BARRAGE 1 - VATOSOLA"));
        assert_eq!(aliases.preferred("vatosola"), None);
    }

    #[test]
    fn test_load_alias_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.json");
        std::fs::write(&path, r#"{"ROVA": "BARRAGE ROVA"}"#).unwrap();

        let aliases = AliasMap::load(&path).unwrap();
        assert_eq!(aliases.preferred("ROVA"), Some("BARRAGE ROVA"));
        assert_eq!(aliases.len(), 1);
    }

    #[test]
    fn test_default_links_preset() {
        let links = load_reservoir_links(None).unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].source, "ROVA");
        assert_eq!(links[0].destination, "MORTHOMME");
    }

    #[test]
    fn test_load_links_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        std::fs::write(
            &path,
            r#"[{"source": "A", "destination": "B"}]"#,
        )
        .unwrap();

        let links = load_reservoir_links(Some(&path)).unwrap();
        assert_eq!(
            links,
            vec![ReservoirLink {
                source: "A".to_string(),
                destination: "B".to_string()
            }]
        );
    }
}
