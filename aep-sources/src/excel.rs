//! Lecture des classeurs Excel
//!
//! Deux formats cohabitent dans les dépôts de données:
//! - les rôles de bornes (colonnes nommées `Ref_borne`, `Cartier`, `Type`);
//! - le classeur de correspondance borne → tronçon (deux colonnes, détecté
//!   par reniflage des en-têtes).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::types::BorneRow;

/// Lit un rôle de bornes (colonnes `Ref_borne`, `Cartier`, `Type`)
///
/// Les en-têtes sont repérés insensiblement à la casse; la colonne
/// `Ref_borne` est obligatoire, les deux autres sont facultatives.
pub fn read_borne_roll(path: &Path) -> Result<Vec<BorneRow>, SourceError> {
    let range = first_sheet_range(path)?;
    let mut rows_iter = range.rows();

    let headers = rows_iter
        .next()
        .ok_or_else(|| SourceError::workbook(path.display().to_string(), "feuille vide"))?;

    let col_ref = find_column(headers, |h| h == "ref_borne").ok_or_else(|| {
        SourceError::MissingColumn {
            column: "Ref_borne".to_string(),
            file: path.display().to_string(),
        }
    })?;
    let col_quartier = find_column(headers, |h| h == "cartier" || h == "quartier");
    let col_type = find_column(headers, |h| h == "type");

    let mut rows = Vec::new();
    for (idx, row) in rows_iter.enumerate() {
        let record = BorneRow {
            row: idx as u32 + 2,
            ref_borne: cell_text(row.get(col_ref)),
            quartier: col_quartier.and_then(|c| cell_text(row.get(c))),
            type_borne: col_type.and_then(|c| cell_text(row.get(c))),
        };
        if record.ref_borne.is_none()
            && record.quartier.is_none()
            && record.type_borne.is_none()
        {
            continue;
        }
        rows.push(record);
    }

    debug!(file = %path.display(), rows = rows.len(), "Rôle de bornes lu");
    Ok(rows)
}

/// Charge le classeur de correspondance et retourne le mapping ref_borne → tronçon
///
/// Détection des colonnes par contenu d'en-tête (`ref_borne`, `tronçon` /
/// `troncon`); à défaut, repli sur les deux premières colonnes.
pub fn read_troncon_mapping(path: &Path) -> Result<HashMap<String, String>, SourceError> {
    let range = first_sheet_range(path)?;
    let mut rows_iter = range.rows();

    let headers = rows_iter
        .next()
        .ok_or_else(|| SourceError::workbook(path.display().to_string(), "feuille vide"))?;

    let col_borne = find_column(headers, |h| h.contains("ref_borne"));
    let col_troncon = find_column(headers, |h| h.contains("tronçon") || h.contains("troncon"));

    let (col_borne, col_troncon) = match (col_borne, col_troncon) {
        (Some(b), Some(t)) => (b, t),
        _ => {
            warn!(
                file = %path.display(),
                "Colonnes non détectées automatiquement, utilisation des deux premières colonnes"
            );
            (0, if headers.len() > 1 { 1 } else { 0 })
        }
    };

    let mut mapping = HashMap::new();
    for row in rows_iter {
        let Some(borne) = cell_text(row.get(col_borne)) else {
            continue;
        };
        let Some(troncon) = cell_text(row.get(col_troncon)) else {
            continue;
        };
        mapping.insert(borne, troncon);
    }

    info!(file = %path.display(), mappings = mapping.len(), "Mappings chargés");
    Ok(mapping)
}

/// Cherche le classeur de correspondance dans un dossier
///
/// Un classeur est retenu si sa ligne d'en-tête contient à la fois une
/// colonne borne et une colonne tronçon. Les classeurs illisibles sont
/// ignorés silencieusement.
pub fn find_mapping_workbook(dir: &Path) -> Result<Option<PathBuf>, SourceError> {
    for path in collect_workbooks(dir)? {
        let Ok(range) = first_sheet_range(&path) else {
            continue;
        };
        let Some(headers) = range.rows().next() else {
            continue;
        };

        let has_borne = find_column(headers, |h| h.contains("ref_borne") || h.contains("borne"))
            .is_some();
        let has_troncon =
            find_column(headers, |h| h.contains("tronçon") || h.contains("troncon")).is_some();

        if has_borne && has_troncon {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Collecte les classeurs `.xlsx`/`.xls` d'un dossier, triés par nom
pub fn collect_workbooks(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_workbook = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| {
                e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xls")
            });
        if is_workbook {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Ouvre la première feuille d'un classeur
fn first_sheet_range(path: &Path) -> Result<calamine::Range<Data>, SourceError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| SourceError::workbook(path.display().to_string(), e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names
        .first()
        .ok_or_else(|| SourceError::workbook(path.display().to_string(), "aucune feuille"))?;

    workbook
        .worksheet_range(first)
        .map_err(|e| SourceError::workbook(path.display().to_string(), e.to_string()))
}

/// Index de la première colonne dont l'en-tête (minuscules, trim) satisfait le prédicat
fn find_column(headers: &[Data], pred: impl Fn(&str) -> bool) -> Option<usize> {
    headers.iter().position(|cell| {
        cell_text(Some(cell))
            .map(|h| pred(&h.to_lowercase()))
            .unwrap_or(false)
    })
}

/// Contenu d'une cellule rendu en texte (trim, `123.0` → `"123"`), vide → None
fn cell_text(cell: Option<&Data>) -> Option<String> {
    let rendered = match cell? {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) => s.trim().to_string(),
        Data::Empty | Data::Error(_) => return None,
        other => other.to_string().trim().to_string(),
    };

    (!rendered.is_empty()).then_some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn write_workbook(dir: &Path, name: &str, rows: &[&[&str]]) -> PathBuf {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
        let path = dir.join(name);
        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn test_read_borne_roll() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(
            dir.path(),
            "bornes.xlsx",
            &[
                &["Ref_borne", "Cartier", "Type"],
                &["BF-001", "Ampasambazaha", "BORNE FONTAINE"],
                &["", "Isada", ""],
            ],
        );

        let rows = read_borne_roll(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ref_borne.as_deref(), Some("BF-001"));
        assert_eq!(rows[0].quartier.as_deref(), Some("Ampasambazaha"));
        assert_eq!(rows[0].type_borne.as_deref(), Some("BORNE FONTAINE"));
        assert_eq!(rows[1].row, 3);
        assert_eq!(rows[1].ref_borne, None);
    }

    #[test]
    fn test_read_borne_roll_missing_ref_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(dir.path(), "bad.xlsx", &[&["Nom", "Cartier"]]);

        let err = read_borne_roll(&path).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { .. }));
    }

    #[test]
    fn test_read_troncon_mapping_detects_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(
            dir.path(),
            "mapping.xlsx",
            &[
                &["Ref_borne", "Tronçon"],
                &["BF-001", "ROVA - MORTHOMME"],
                &["BF-002", ""],
            ],
        );

        let mapping = read_troncon_mapping(&path).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(
            mapping.get("BF-001").map(String::as_str),
            Some("ROVA - MORTHOMME")
        );
    }

    #[test]
    fn test_read_troncon_mapping_falls_back_to_first_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(
            dir.path(),
            "mapping.xlsx",
            &[&["A", "B"], &["BF-001", "T1"]],
        );

        let mapping = read_troncon_mapping(&path).unwrap();
        assert_eq!(mapping.get("BF-001").map(String::as_str), Some("T1"));
    }

    #[test]
    fn test_find_mapping_workbook() {
        let dir = tempfile::tempdir().unwrap();
        write_workbook(
            dir.path(),
            "roll.xlsx",
            &[&["Ref_borne", "Cartier", "Type"]],
        );
        let mapping_path = write_workbook(
            dir.path(),
            "zmapping.xlsx",
            &[&["Ref_borne", "Troncon"]],
        );

        let found = find_mapping_workbook(dir.path()).unwrap();
        assert_eq!(found, Some(mapping_path));
    }

    #[test]
    fn test_find_mapping_workbook_none() {
        let dir = tempfile::tempdir().unwrap();
        write_workbook(dir.path(), "roll.xlsx", &[&["Ref_borne", "Cartier"]]);
        assert_eq!(find_mapping_workbook(dir.path()).unwrap(), None);
    }
}
