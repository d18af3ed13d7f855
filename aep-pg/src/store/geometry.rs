//! Encodage des géométries pour PostGIS
//!
//! Les géométries partent vers la base en EWKT (`SRID=29702;…`), liées via
//! `ST_GeomFromEWKT($n)` dans les ordres INSERT.

use anyhow::{Context, Result};
use geo::Geometry;
use geozero::wkt::WktWriter;
use geozero::GeozeroGeometry;

/// Décode une géométrie GeoJSON (sortie de `ST_AsGeoJSON`) en types `geo`
pub fn from_geojson_str(s: &str) -> Result<Geometry<f64>> {
    let document: geojson::GeoJson = s.parse().context("Invalid GeoJSON geometry")?;
    let geojson::GeoJson::Geometry(geometry) = document else {
        anyhow::bail!("Expected a bare GeoJSON geometry");
    };
    Geometry::<f64>::try_from(geometry.value).context("Unsupported GeoJSON geometry type")
}

/// Encode une géométrie `geo` en EWKT avec le SRID donné
pub fn to_ewkt(geom: &Geometry<f64>, srid: u32) -> Result<String> {
    let mut wkt_buf: Vec<u8> = Vec::with_capacity(256);
    {
        let mut writer = WktWriter::new(&mut wkt_buf);
        geom.process_geom(&mut writer)
            .context("Failed to encode geometry to WKT")?;
    }
    let wkt = String::from_utf8(wkt_buf).context("WKT output is not valid UTF-8")?;

    Ok(format!("SRID={};{}", srid, wkt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, MultiPolygon};

    #[test]
    fn test_to_ewkt_point() {
        let p = Geometry::Point(point!(x: 478503.1, y: 7613200.0));
        let ewkt = to_ewkt(&p, 29702).unwrap();
        assert!(ewkt.starts_with("SRID=29702;POINT"));
        assert!(ewkt.contains("478503.1"));
    }

    #[test]
    fn test_to_ewkt_multipolygon() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let mp = Geometry::MultiPolygon(MultiPolygon::new(vec![poly]));
        let ewkt = to_ewkt(&mp, 29702).unwrap();
        assert!(ewkt.starts_with("SRID=29702;MULTIPOLYGON"));
    }

    #[test]
    fn test_to_ewkt_wgs84_point() {
        let p = Geometry::Point(point!(x: 47.085, y: -21.453));
        let ewkt = to_ewkt(&p, 4326).unwrap();
        assert!(ewkt.starts_with("SRID=4326;POINT"));
    }

    #[test]
    fn test_from_geojson_str() {
        let g = from_geojson_str(r#"{"type":"Point","coordinates":[1.0,2.0]}"#).unwrap();
        assert!(matches!(g, Geometry::Point(_)));

        assert!(from_geojson_str("{...}").is_err());
        assert!(from_geojson_str(r#"{"type":"FeatureCollection","features":[]}"#).is_err());
    }
}
