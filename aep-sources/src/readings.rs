//! Lecture des fichiers CSV de relevés
//!
//! Format: trois colonnes positionnelles `quantite,date,identifiant`, sans
//! en-tête. L'identifiant est un nom de captage, un nom de station ou une
//! référence de borne selon la table cible.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SourceError;
use crate::types::{RawReading, ReadingRow};

/// Lit un fichier CSV de relevés et retourne une ligne par enregistrement
///
/// Les lignes dont le nombre de colonnes n'est pas exactement trois sont
/// retournées comme [`ReadingRow::Malformed`] — c'est à l'appelant de les
/// compter, jamais d'interrompre le fichier pour autant.
pub fn read_readings(path: &Path) -> Result<Vec<ReadingRow>, SourceError> {
    let bytes = fs::read(path)?;
    let decoded = decode_text(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let mut rows = Vec::new();

    for (idx, record) in reader.records().enumerate() {
        let line = idx as u64 + 1;
        let record = record.map_err(|source| SourceError::Csv {
            file: path.display().to_string(),
            source,
        })?;

        if record.len() != 3 {
            rows.push(ReadingRow::Malformed { line });
            continue;
        }

        rows.push(ReadingRow::Record(RawReading {
            line,
            quantity: record.get(0).unwrap_or("").trim().to_string(),
            date: record.get(1).unwrap_or("").trim().to_string(),
            identifier: record.get(2).unwrap_or("").trim().to_string(),
        }));
    }

    debug!(
        file = %path.display(),
        rows = rows.len(),
        "Fichier de relevés lu"
    );

    Ok(rows)
}

/// Décode les bytes d'un fichier source (UTF-8, repli WINDOWS-1252)
///
/// Les exports historiques mélangent les deux encodages pour les libellés
/// accentués.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Collecte les fichiers `.csv` d'un dossier, triés par nom
pub fn collect_csv_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .unwrap();
        f.write_all(content).unwrap();
        f
    }

    #[test]
    fn test_read_readings_basic() {
        let f = write_fixture(b"120.5,2023-04-01,ROVA\n,,\n");
        let rows = read_readings(f.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            ReadingRow::Record(RawReading {
                line: 1,
                quantity: "120.5".to_string(),
                date: "2023-04-01".to_string(),
                identifier: "ROVA".to_string(),
            })
        );
        assert_eq!(
            rows[1],
            ReadingRow::Record(RawReading {
                line: 2,
                quantity: String::new(),
                date: String::new(),
                identifier: String::new(),
            })
        );
    }

    #[test]
    fn test_read_readings_trims_fields() {
        let f = write_fixture(b" 12,2023-04-01 , ROVA \n");
        let rows = read_readings(f.path()).unwrap();
        match &rows[0] {
            ReadingRow::Record(r) => {
                assert_eq!(r.quantity, "12");
                assert_eq!(r.date, "2023-04-01");
                assert_eq!(r.identifier, "ROVA");
            }
            other => panic!("unexpected row: {:?}", other),
        }
    }

    #[test]
    fn test_read_readings_malformed_shapes() {
        let f = write_fixture(b"12,2023-04-01\n1,2,3,4\n120,2023-04-02,ROVA\n");
        let rows = read_readings(f.path()).unwrap();
        assert_eq!(rows[0], ReadingRow::Malformed { line: 1 });
        assert_eq!(rows[1], ReadingRow::Malformed { line: 2 });
        assert!(matches!(rows[2], ReadingRow::Record(_)));
    }

    #[test]
    fn test_read_readings_windows_1252_fallback() {
        // "RÉSERVOIR" en WINDOWS-1252: É = 0xC9
        let f = write_fixture(b"12,2023-04-01,R\xC9SERVOIR\n");
        let rows = read_readings(f.path()).unwrap();
        match &rows[0] {
            ReadingRow::Record(r) => assert_eq!(r.identifier, "RÉSERVOIR"),
            other => panic!("unexpected row: {:?}", other),
        }
    }

    #[test]
    fn test_collect_csv_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.CSV", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let files = collect_csv_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }
}
