//! Tests d'intégration PostgreSQL
//!
//! Ces tests nécessitent une base PostGIS disponible et sont destructifs
//! (le schéma cible est recréé). Configuration via variables
//! d'environnement: PGHOST, PGPORT, PGUSER, PGPASSWORD, PGDATABASE.
//!
//! Exécution:
//! ```bash
//! # Avec Docker
//! docker run -d --name postgres-test -e POSTGRES_PASSWORD=test -p 5432:5432 postgis/postgis
//! PGPASSWORD=test PGDATABASE=postgres cargo test --test postgres_integration -- --ignored
//! ```

use anyhow::Result;
use deadpool_postgres::Pool;

use aep_pg::config::AliasMap;
use aep_pg::loader::{run_readings_job, EAU_BRUTE};
use aep_pg::recon::{DuplicateGuard, EntityKind, EntityResolver, ZoneIndex};
use aep_pg::store::pool::{create_pool, DatabaseConfig};
use aep_pg::store::schema::create_schema;

/// Pool de test depuis l'environnement
async fn create_test_pool() -> Result<Pool> {
    let config = DatabaseConfig::from_env();
    create_pool(&config).await
}

/// Recrée le schéma cible et insère le référentiel de test
///
/// Un quartier carré (0,0)-(100,100) contenant un captage, et un second
/// quartier disjoint.
async fn setup_fixture(pool: &Pool) -> Result<(i32, i32)> {
    create_schema(pool).await?;

    let client = pool.get().await?;

    let id_com: i32 = client
        .query_one(
            "INSERT INTO commune (code_com, lib_com) VALUES ('101', 'FIANARANTSOA I') \
             RETURNING id_com",
            &[],
        )
        .await?
        .get(0);

    let id_quartier: i32 = client
        .query_one(
            "INSERT INTO quartier (id_com, code_quartier, lib_quartier, geom) \
             VALUES ($1, 'Q-001', 'FKT Ampasambazaha', \
             ST_Multi(ST_GeomFromEWKT('SRID=29702;POLYGON((0 0,100 0,100 100,0 100,0 0))'))) \
             RETURNING id_quartier",
            &[&id_com],
        )
        .await?
        .get(0);

    client
        .execute(
            "INSERT INTO quartier (id_com, code_quartier, lib_quartier, geom) \
             VALUES ($1, 'Q-002', 'FKT Isada', \
             ST_Multi(ST_GeomFromEWKT('SRID=29702;POLYGON((200 0,300 0,300 100,200 100,200 0))')))",
            &[&id_com],
        )
        .await?;

    let id_capt: i32 = client
        .query_one(
            "INSERT INTO captage (libelle_capt, type_capt, geom, id_quartier) \
             VALUES ('BARRAGE 1 - VATOSOLA', 'barrage', \
             ST_Multi(ST_GeomFromEWKT('SRID=29702;POLYGON((10 10,20 10,20 20,10 20,10 10))')), $1) \
             RETURNING id_capt",
            &[&id_quartier],
        )
        .await?
        .get(0);

    Ok((id_quartier, id_capt))
}

#[tokio::test]
#[ignore]
async fn test_schema_creation() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    create_schema(&pool).await.expect("Failed to create schema");

    let client = pool.get().await.expect("Failed to get connection");

    // L'énumération des types de bornes porte exactement trois valeurs
    let rows = client
        .query(
            "SELECT enumlabel FROM pg_enum e \
             JOIN pg_type t ON t.oid = e.enumtypid \
             WHERE t.typname = 'type_point_distr' ORDER BY e.enumsortorder",
            &[],
        )
        .await
        .expect("Failed to query enum");

    let labels: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
    assert_eq!(
        labels,
        vec![
            "BORNE FONTAINE".to_string(),
            "BORNE PARTICULIER".to_string(),
            "BORNE INSTITUT PUBLIQUE".to_string()
        ]
    );

    // Les tables de relevés existent
    for table in ["eau_brute", "eau_traite", "eau_distribue"] {
        let exists = client
            .query_opt(
                "SELECT 1 FROM information_schema.tables WHERE table_name = $1",
                &[&table],
            )
            .await
            .expect("Failed to check table")
            .is_some();
        assert!(exists, "table {} manquante", table);
    }
}

#[tokio::test]
#[ignore]
async fn test_resolver_and_locator_against_fixture() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    let (id_quartier, id_capt) = setup_fixture(&pool).await.expect("Failed to seed fixture");

    let client = pool.get().await.expect("Failed to get connection");

    // Résolution insensible à la casse et aux espaces, alias compris
    let resolver = EntityResolver::load(
        &client,
        EntityKind::Captage,
        AliasMap::default_preset().unwrap(),
    )
    .await
    .expect("Failed to load resolver");

    assert_eq!(resolver.resolve("barrage 1 - vatosola"), Some(id_capt));
    assert_eq!(resolver.resolve("  VATOSOLA "), Some(id_capt));
    assert_eq!(resolver.resolve("INCONNU"), None);

    // Rattachement spatial: point dans le quartier, point hors de tout
    let zones = ZoneIndex::load(&client).await.expect("Failed to load zones");
    assert_eq!(zones.len(), 2);

    let inside = geo::Geometry::Point(geo::point!(x: 50.0, y: 50.0));
    assert_eq!(zones.locate(&inside), Some(id_quartier));

    let outside = geo::Geometry::Point(geo::point!(x: 1000.0, y: 1000.0));
    assert_eq!(zones.locate(&outside), None);
}

#[tokio::test]
#[ignore]
async fn test_readings_import_is_idempotent() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup_fixture(&pool).await.expect("Failed to seed fixture");

    let dir = tempfile::tempdir().expect("Failed to create tempdir");
    std::fs::write(
        dir.path().join("releves.csv"),
        "120.5,2023-04-01,VATOSOLA\n,,\n10,2023-04-01,INCONNU\n",
    )
    .expect("Failed to write fixture CSV");

    // Premier passage: un relevé inséré via l'alias, un non résolu, un vide
    let first = run_readings_job(
        &pool,
        &EAU_BRUTE,
        dir.path(),
        AliasMap::default_preset().unwrap(),
    )
    .await
    .expect("First import failed");

    assert_eq!(first.totals.total, 2);
    assert_eq!(first.totals.success, 1);
    assert_eq!(first.totals.skipped_empty, 1);
    assert_eq!(first.totals.entity_not_found, 1);
    assert_eq!(first.totals.duplicates, 0);

    let client = pool.get().await.expect("Failed to get connection");
    let count: i64 = client
        .query_one("SELECT COUNT(*) FROM eau_brute", &[])
        .await
        .expect("Failed to count")
        .get(0);
    assert_eq!(count, 1);

    let quantity: f64 = client
        .query_one("SELECT quantite::float8 FROM eau_brute", &[])
        .await
        .expect("Failed to read quantity")
        .get(0);
    assert!((quantity - 120.5).abs() < f64::EPSILON);
    drop(client);

    // Second passage: le relevé déjà présent devient un doublon, rien ne change
    let second = run_readings_job(
        &pool,
        &EAU_BRUTE,
        dir.path(),
        AliasMap::default_preset().unwrap(),
    )
    .await
    .expect("Second import failed");

    assert_eq!(second.totals.success, 0);
    assert_eq!(second.totals.duplicates, first.totals.success);

    let client = pool.get().await.expect("Failed to get connection");
    let count_after: i64 = client
        .query_one("SELECT COUNT(*) FROM eau_brute", &[])
        .await
        .expect("Failed to count")
        .get(0);
    assert_eq!(count_after, 1);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_guard_preloads_existing_pairs() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    let (_, id_capt) = setup_fixture(&pool).await.expect("Failed to seed fixture");

    let client = pool.get().await.expect("Failed to get connection");

    client
        .execute(
            "INSERT INTO eau_brute (quantite, date, id_capt) VALUES (12.5, '2023-04-01', $1)",
            &[&id_capt],
        )
        .await
        .expect("Failed to insert fact");
    client
        .execute(
            "INSERT INTO eau_brute (quantite, date, id_capt) VALUES (13.0, NULL, $1)",
            &[&id_capt],
        )
        .await
        .expect("Failed to insert dateless fact");

    let guard = DuplicateGuard::load(&client, "eau_brute", "id_capt")
        .await
        .expect("Failed to load guard");

    assert_eq!(guard.len(), 2);
    assert!(guard.contains(Some("2023-04-01".parse().unwrap()), id_capt));
    // La date absente est une valeur de clé à part entière
    assert!(guard.contains(None, id_capt));
    assert!(!guard.contains(Some("2023-04-02".parse().unwrap()), id_capt));
}
