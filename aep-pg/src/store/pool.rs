//! Pools de connexions PostgreSQL
//!
//! Deux bases peuvent être en jeu: la cible harmonisée (variables `PG*`) et
//! l'ancienne base relationnelle source (variables `SRC_PG*`).

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Object, Pool, PoolConfig, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::{NoTls, Transaction};
use tokio_postgres_rustls::MakeRustlsConnect;

/// Mode SSL pour la connexion PostgreSQL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// Pas de SSL (défaut)
    #[default]
    Disable,
    /// SSL préféré mais non requis
    Prefer,
    /// SSL requis
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" | "true" | "yes" => Ok(SslMode::Require),
            _ => Err(format!(
                "Invalid SSL mode: {}. Use: disable, prefer, require",
                s
            )),
        }
    }
}

/// Configuration d'une base de données
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub ssl_mode: SslMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "aep_harmonise".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 4,
            ssl_mode: SslMode::Disable,
        }
    }
}

impl DatabaseConfig {
    /// Charge la configuration de la base cible depuis les variables `PG*`
    pub fn from_env() -> Self {
        Self::from_env_prefixed("PG", "aep_harmonise")
    }

    /// Charge la configuration de la base source depuis les variables `SRC_PG*`
    pub fn source_from_env() -> Self {
        Self::from_env_prefixed("SRC_PG", "aep_jirama")
    }

    fn from_env_prefixed(prefix: &str, default_dbname: &str) -> Self {
        let var = |suffix: &str| std::env::var(format!("{}{}", prefix, suffix));

        Self {
            host: var("HOST").unwrap_or_else(|_| "localhost".into()),
            port: var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5432),
            dbname: var("DATABASE").unwrap_or_else(|_| default_dbname.into()),
            user: var("USER").unwrap_or_else(|_| "postgres".into()),
            password: var("PASSWORD").ok(),
            pool_size: var("POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            ssl_mode: var("SSLMODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }
}

/// Crée la configuration TLS pour rustls
fn make_tls_connector() -> Result<MakeRustlsConnect> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(config))
}

/// Crée un pool de connexions
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();

    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(30)),
            create: Some(Duration::from_secs(10)),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    match config.ssl_mode {
        SslMode::Disable => cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create database pool"),
        SslMode::Prefer | SslMode::Require => {
            let tls = make_tls_connector()?;
            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .context("Failed to create database pool with TLS")
        }
    }
}

/// Démarre une transaction sur une connexion du pool
///
/// Retourne la transaction tokio-postgres sous-jacente, qui porte les
/// SAVEPOINT par enregistrement.
pub async fn begin_transaction(client: &mut Object) -> Result<Transaction<'_>> {
    tokio_postgres::Client::transaction(client)
        .await
        .context("Failed to begin transaction")
}

/// Teste la connexion à la base
pub async fn test_connection(pool: &Pool) -> Result<()> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    client
        .execute("SELECT 1", &[])
        .await
        .context("Connection test failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parsing() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("prefer".parse::<SslMode>().unwrap(), SslMode::Prefer);
        assert_eq!("REQUIRE".parse::<SslMode>().unwrap(), SslMode::Require);
        assert!("tls-mais-pas-trop".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let cfg = DatabaseConfig::default();
        assert_eq!(cfg.dbname, "aep_harmonise");
        assert_eq!(cfg.port, 5432);
        assert_eq!(cfg.ssl_mode, SslMode::Disable);
    }
}
