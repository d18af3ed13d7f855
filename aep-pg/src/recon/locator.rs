//! Rattachement spatial des ouvrages à leur quartier
//!
//! Les limites de quartiers sont chargées une fois depuis la base cible,
//! puis chaque géométrie (point d'une station, emprise d'un captage) est
//! testée en contenance stricte. La géométrie est supposée déjà exprimée
//! dans le SRID planaire du schéma cible.

use anyhow::{Context, Result};
use geo::{Geometry, Relate};
use tokio_postgres::Client;
use tracing::{info, warn};

/// Un quartier et sa limite
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: i32,
    pub boundary: Geometry<f64>,
}

/// Index des limites de quartiers, en ordre de stockage
#[derive(Debug, Default)]
pub struct ZoneIndex {
    zones: Vec<Zone>,
}

impl ZoneIndex {
    /// Charge les limites depuis la table `quartier`
    pub async fn load(client: &Client) -> Result<Self> {
        let rows = client
            .query(
                "SELECT id_quartier, ST_AsGeoJSON(geom) FROM quartier \
                 WHERE geom IS NOT NULL ORDER BY id_quartier",
                &[],
            )
            .await
            .context("Failed to load quartier boundaries")?;

        let mut zones = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i32 = row.get(0);
            let geojson: String = row.get(1);

            let boundary = crate::store::geometry::from_geojson_str(&geojson)
                .with_context(|| format!("Invalid boundary geometry for quartier {}", id))?;

            zones.push(Zone { id, boundary });
        }

        info!(zones = zones.len(), "Limites de quartiers chargées");
        Ok(Self { zones })
    }

    /// Construit un index depuis des zones déjà en mémoire
    pub fn from_zones(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    /// Nombre de zones indexées
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Vrai si l'index est vide
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Quartier contenant strictement la géométrie
    ///
    /// Premier quartier par ordre de stockage en cas de limites
    /// chevauchantes (un warning est émis), `None` si aucun ne contient —
    /// issue normale, comptée par l'appelant, jamais fatale pour le lot.
    pub fn locate(&self, geometry: &Geometry<f64>) -> Option<i32> {
        let matches: Vec<i32> = self
            .zones
            .iter()
            .filter(|zone| zone.boundary.relate(geometry).is_contains())
            .map(|zone| zone.id)
            .collect();

        if matches.len() > 1 {
            warn!(
                quartiers = ?matches,
                "Géométrie contenue dans plusieurs quartiers, premier retenu"
            );
        }

        matches.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, MultiPolygon};

    fn square(id: i32, x0: f64, y0: f64, size: f64) -> Zone {
        let poly = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ];
        Zone {
            id,
            boundary: Geometry::MultiPolygon(MultiPolygon::new(vec![poly])),
        }
    }

    #[test]
    fn test_locate_point_inside_single_zone() {
        let index = ZoneIndex::from_zones(vec![square(1, 0.0, 0.0, 10.0), square(2, 20.0, 0.0, 10.0)]);
        let p = Geometry::Point(point!(x: 25.0, y: 5.0));
        assert_eq!(index.locate(&p), Some(2));
    }

    #[test]
    fn test_locate_point_outside_all_zones() {
        let index = ZoneIndex::from_zones(vec![square(1, 0.0, 0.0, 10.0)]);
        let p = Geometry::Point(point!(x: 50.0, y: 50.0));
        assert_eq!(index.locate(&p), None);
    }

    #[test]
    fn test_locate_polygon_inside_zone() {
        let index = ZoneIndex::from_zones(vec![square(3, 0.0, 0.0, 100.0)]);
        let inner = polygon![
            (x: 10.0, y: 10.0),
            (x: 20.0, y: 10.0),
            (x: 20.0, y: 20.0),
            (x: 10.0, y: 20.0),
            (x: 10.0, y: 10.0),
        ];
        let mp = Geometry::MultiPolygon(MultiPolygon::new(vec![inner]));
        assert_eq!(index.locate(&mp), Some(3));
    }

    #[test]
    fn test_locate_overlapping_zones_first_wins() {
        // Deux carrés superposés: l'ordre de stockage départage
        let index = ZoneIndex::from_zones(vec![square(1, 0.0, 0.0, 10.0), square(2, 0.0, 0.0, 10.0)]);
        let p = Geometry::Point(point!(x: 5.0, y: 5.0));
        assert_eq!(index.locate(&p), Some(1));
    }

    #[test]
    fn test_locate_boundary_point_is_not_contained() {
        // Contenance stricte: un point sur la limite n'appartient pas au quartier
        let index = ZoneIndex::from_zones(vec![square(1, 0.0, 0.0, 10.0)]);
        let p = Geometry::Point(point!(x: 0.0, y: 5.0));
        assert_eq!(index.locate(&p), None);
    }
}
