//! Lecture des FeatureCollections GeoJSON
//!
//! Couvre les limites administratives (quartiers, MultiPolygon) et les
//! semis de points (noeuds de consommation).

use std::fs;
use std::path::Path;

use geojson::GeoJson;
use tracing::info;

use crate::error::SourceError;
use crate::types::GeoFeature;

/// Charge une FeatureCollection GeoJSON
///
/// Le document doit être de type `FeatureCollection`; les features sans
/// géométrie sont conservées avec `geometry: None` pour que l'appelant les
/// compte comme erreurs d'enregistrement.
pub fn read_feature_collection(path: &Path) -> Result<Vec<GeoFeature>, SourceError> {
    let content = fs::read_to_string(path)?;
    let file = path.display().to_string();

    let geojson: GeoJson = content
        .parse()
        .map_err(|e: geojson::Error| SourceError::invalid_geojson(&file, e.to_string()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => {
            return Err(SourceError::invalid_geojson(
                &file,
                "le document doit être de type FeatureCollection",
            ))
        }
    };

    let mut features = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.into_iter().enumerate() {
        let geometry = match feature.geometry {
            Some(g) => Some(geo::Geometry::<f64>::try_from(g.value).map_err(|e| {
                SourceError::invalid_geojson(
                    &file,
                    format!("feature {}: géométrie inconvertible: {}", index, e),
                )
            })?),
            None => None,
        };

        features.push(GeoFeature {
            index,
            geometry,
            properties: feature.properties.unwrap_or_default(),
        });
    }

    info!(
        file = %path.display(),
        features = features.len(),
        "Fichier GeoJSON chargé"
    );

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Geometry;
    use std::io::Write;

    fn write_fixture(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".geojson")
            .tempfile()
            .unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_read_feature_collection_points_and_props() {
        let f = write_fixture(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[47.08,-21.45]},
                 "properties":{"libelle":"NC-12","id_troncon":"ROVA->MORTHOMME"}}
            ]}"#,
        );

        let features = read_feature_collection(f.path()).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].prop_str("libelle").as_deref(), Some("NC-12"));
        assert!(matches!(features[0].geometry, Some(Geometry::Point(_))));
    }

    #[test]
    fn test_read_feature_collection_missing_geometry_kept() {
        let f = write_fixture(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":null,"properties":{"code_quartier":"Q1"}}
            ]}"#,
        );

        let features = read_feature_collection(f.path()).unwrap();
        assert_eq!(features.len(), 1);
        assert!(features[0].geometry.is_none());
    }

    #[test]
    fn test_read_feature_collection_rejects_bare_geometry() {
        let f = write_fixture(r#"{"type":"Point","coordinates":[0.0,0.0]}"#);
        let err = read_feature_collection(f.path()).unwrap_err();
        assert!(matches!(err, SourceError::InvalidGeoJson { .. }));
    }

    #[test]
    fn test_read_feature_collection_rejects_invalid_json() {
        let f = write_fixture("{pas du json");
        assert!(read_feature_collection(f.path()).is_err());
    }

    #[test]
    fn test_read_feature_collection_multipolygon() {
        let f = write_fixture(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature",
                 "geometry":{"type":"MultiPolygon","coordinates":[[[[0,0],[10,0],[10,10],[0,10],[0,0]]]]},
                 "properties":{"id_com":1,"code_quartier":"FKT-001","lib_quartier":"FKT Ampasambazaha"}}
            ]}"#,
        );

        let features = read_feature_collection(f.path()).unwrap();
        assert!(matches!(
            features[0].geometry,
            Some(Geometry::MultiPolygon(_))
        ));
        assert_eq!(features[0].prop_i32("id_com"), Some(1));
    }
}
