//! Définition et implémentation des commandes CLI
//!
//! Une sous-commande par unité de migration, dans l'ordre naturel du
//! référentiel: `init-schema`, les ouvrages (communes → bornes), puis les
//! relevés (`eau-brute`, `eau-traite`, `eau-distribue`). Chaque unité est un
//! job autonome: connexion, migration, statistiques, sortie.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use deadpool_postgres::Pool;
use tracing::info;

use crate::config::{load_reservoir_links, AliasMap};
use crate::loader;
use crate::migrate;
use crate::store::pool::{create_pool, test_connection, DatabaseConfig};
use crate::store::schema;

/// Migrer les données AEP hétérogènes vers le schéma harmonisé PostGIS
#[derive(Parser)]
#[command(name = "aep-pg")]
#[command(author, version)]
#[command(about = "Migrer les données AEP (CSV, Excel, GeoJSON, base héritée) vers PostGIS")]
#[command(
    long_about = "Suite de migration vers la base AEP harmonisée.\n\n\
    Chaque sous-commande est un job de migration autonome; les fichiers \
    sources sont pris dans le dossier de travail sauf option contraire."
)]
pub struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Unité de migration à exécuter
    #[command(subcommand)]
    pub command: Commands,
}

/// Surcharges de connexion à la base cible (défaut: env `PG*`)
#[derive(Args, Debug, Default, Clone)]
pub struct TargetArgs {
    /// Hôte PostgreSQL cible (défaut: env PGHOST / localhost)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Base cible (défaut: env PGDATABASE / aep_harmonise)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Utilisateur (défaut: env PGUSER / postgres)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Mot de passe (défaut: env PGPASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Port (défaut: env PGPORT / 5432)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Mode SSL: disable, prefer, require (défaut: env PGSSLMODE / disable)
    #[arg(long, global = true)]
    pub ssl: Option<String>,
}

/// Surcharges de connexion à la base source héritée (défaut: env `SRC_PG*`)
#[derive(Args, Debug, Default, Clone)]
pub struct SourceArgs {
    /// Hôte PostgreSQL source (défaut: env SRC_PGHOST / localhost)
    #[arg(long, global = true)]
    pub src_host: Option<String>,

    /// Base source (défaut: env SRC_PGDATABASE / aep_jirama)
    #[arg(long, global = true)]
    pub src_database: Option<String>,

    /// Utilisateur source (défaut: env SRC_PGUSER / postgres)
    #[arg(long, global = true)]
    pub src_user: Option<String>,

    /// Mot de passe source (défaut: env SRC_PGPASSWORD)
    #[arg(long, global = true)]
    pub src_password: Option<String>,

    /// Port source (défaut: env SRC_PGPORT / 5432)
    #[arg(long, global = true)]
    pub src_port: Option<u16>,

    /// Mode SSL source (défaut: env SRC_PGSSLMODE / disable)
    #[arg(long, global = true)]
    pub src_ssl: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Créer le schéma cible (destructif: tables existantes supprimées)
    InitSchema,

    /// Migrer les communes depuis la base source héritée
    Communes,

    /// Migrer les quartiers depuis un GeoJSON de limites
    Quartiers {
        /// Fichier GeoJSON des limites de quartiers
        #[arg(short, long, default_value = "quartier_rhm.geojson")]
        file: PathBuf,
    },

    /// Migrer les captages depuis la base source héritée
    Captages,

    /// Migrer les stations de traitement depuis la base source héritée
    Stations,

    /// Migrer les réservoirs depuis la base source héritée
    Reservoirs,

    /// Créer les liaisons réservoir → réservoir configurées
    ReservoirLinks {
        /// Fichier JSON des liaisons (défaut: preset embarqué)
        #[arg(long)]
        links: Option<PathBuf>,
    },

    /// Migrer les noeuds de consommation depuis un GeoJSON de points
    Noeuds {
        /// Fichier GeoJSON des noeuds
        #[arg(short, long, default_value = "noeud_consommation.geojson")]
        file: PathBuf,
    },

    /// Importer les rôles de bornes Excel du dossier
    Bornes {
        /// Dossier contenant les classeurs Excel
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Importer les relevés d'eau brute (CSV) du dossier
    EauBrute {
        /// Dossier contenant les fichiers CSV
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Fichier JSON d'alias de résolution (défaut: preset embarqué)
        #[arg(long)]
        aliases: Option<PathBuf>,
    },

    /// Importer les relevés d'eau traitée (CSV) du dossier
    EauTraite {
        /// Dossier contenant les fichiers CSV
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Fichier JSON d'alias de résolution (défaut: preset embarqué)
        #[arg(long)]
        aliases: Option<PathBuf>,
    },

    /// Importer les relevés d'eau distribuée (CSV) du dossier
    EauDistribue {
        /// Dossier contenant les fichiers CSV
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Fichier JSON d'alias de résolution (défaut: preset embarqué)
        #[arg(long)]
        aliases: Option<PathBuf>,
    },
}

impl Commands {
    /// Nom du job, utilisé pour le fichier de log
    pub fn job_name(&self) -> &'static str {
        match self {
            Commands::InitSchema => "creation_base",
            Commands::Communes => "commune",
            Commands::Quartiers { .. } => "quartier",
            Commands::Captages => "captage",
            Commands::Stations => "station_traitement",
            Commands::Reservoirs => "reservoir",
            Commands::ReservoirLinks { .. } => "reservoir_reservoir",
            Commands::Noeuds { .. } => "noeud_consommation",
            Commands::Bornes { .. } => "points_distribution",
            Commands::EauBrute { .. } => "eau_brute",
            Commands::EauTraite { .. } => "eau_traite",
            Commands::EauDistribue { .. } => "eau_distribue",
        }
    }
}

/// Exécute la sous-commande demandée
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::InitSchema => {
            let target = target_pool(&cli.target).await?;
            schema::create_schema(&target).await
        }
        Commands::Communes => {
            let source = source_pool(&cli.source).await?;
            let target = target_pool(&cli.target).await?;
            migrate::communes::run(&source, &target).await?;
            Ok(())
        }
        Commands::Quartiers { file } => {
            let target = target_pool(&cli.target).await?;
            migrate::quartiers::run(&target, &file).await?;
            Ok(())
        }
        Commands::Captages => {
            let source = source_pool(&cli.source).await?;
            let target = target_pool(&cli.target).await?;
            migrate::captages::run(&source, &target).await?;
            Ok(())
        }
        Commands::Stations => {
            let source = source_pool(&cli.source).await?;
            let target = target_pool(&cli.target).await?;
            migrate::stations::run(&source, &target).await?;
            Ok(())
        }
        Commands::Reservoirs => {
            let source = source_pool(&cli.source).await?;
            let target = target_pool(&cli.target).await?;
            migrate::reservoirs::run(&source, &target).await?;
            Ok(())
        }
        Commands::ReservoirLinks { links } => {
            let target = target_pool(&cli.target).await?;
            let links = load_reservoir_links(links.as_deref())?;
            migrate::reservoir_links::run(&target, &links, AliasMap::default()).await?;
            Ok(())
        }
        Commands::Noeuds { file } => {
            let target = target_pool(&cli.target).await?;
            migrate::noeuds::run(&target, &file).await?;
            Ok(())
        }
        Commands::Bornes { dir } => {
            let target = target_pool(&cli.target).await?;
            migrate::bornes::run(&target, &dir).await?;
            Ok(())
        }
        Commands::EauBrute { dir, aliases } => {
            let target = target_pool(&cli.target).await?;
            let aliases = load_aliases(aliases.as_deref())?;
            loader::run_readings_job(&target, &loader::EAU_BRUTE, &dir, aliases).await?;
            Ok(())
        }
        Commands::EauTraite { dir, aliases } => {
            let target = target_pool(&cli.target).await?;
            let aliases = load_aliases(aliases.as_deref())?;
            loader::run_readings_job(&target, &loader::EAU_TRAITE, &dir, aliases).await?;
            Ok(())
        }
        Commands::EauDistribue { dir, aliases } => {
            let target = target_pool(&cli.target).await?;
            let aliases = load_aliases(aliases.as_deref())?;
            loader::run_readings_job(&target, &loader::EAU_DISTRIBUE, &dir, aliases).await?;
            Ok(())
        }
    }
}

/// Charge la table d'alias (fichier fourni ou preset embarqué)
fn load_aliases(path: Option<&std::path::Path>) -> Result<AliasMap> {
    match path {
        Some(p) => AliasMap::load(p),
        None => AliasMap::default_preset(),
    }
}

/// Construit et teste le pool vers la base cible
async fn target_pool(args: &TargetArgs) -> Result<Pool> {
    let mut config = DatabaseConfig::from_env();
    apply_target_overrides(&mut config, args);

    let pool = create_pool(&config).await?;
    test_connection(&pool)
        .await
        .context("Échec de connexion à la base de données cible")?;

    info!(
        host = config.host.as_str(),
        database = config.dbname.as_str(),
        "Connexion à la base cible réussie"
    );
    Ok(pool)
}

/// Construit et teste le pool vers la base source héritée
async fn source_pool(args: &SourceArgs) -> Result<Pool> {
    let mut config = DatabaseConfig::source_from_env();
    apply_source_overrides(&mut config, args);

    let pool = create_pool(&config).await?;
    test_connection(&pool)
        .await
        .context("Échec de connexion à la base de données source")?;

    info!(
        host = config.host.as_str(),
        database = config.dbname.as_str(),
        "Connexion à la base source réussie"
    );
    Ok(pool)
}

fn apply_target_overrides(config: &mut DatabaseConfig, args: &TargetArgs) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(database) = &args.database {
        config.dbname = database.clone();
    }
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ssl) = &args.ssl {
        if let Ok(mode) = ssl.parse() {
            config.ssl_mode = mode;
        }
    }
}

fn apply_source_overrides(config: &mut DatabaseConfig, args: &SourceArgs) {
    if let Some(host) = &args.src_host {
        config.host = host.clone();
    }
    if let Some(database) = &args.src_database {
        config.dbname = database.clone();
    }
    if let Some(user) = &args.src_user {
        config.user = user.clone();
    }
    if let Some(password) = &args.src_password {
        config.password = Some(password.clone());
    }
    if let Some(port) = args.src_port {
        config.port = port;
    }
    if let Some(ssl) = &args.src_ssl {
        if let Ok(mode) = ssl.parse() {
            config.ssl_mode = mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_names() {
        assert_eq!(Commands::InitSchema.job_name(), "creation_base");
        assert_eq!(
            Commands::EauBrute {
                dir: PathBuf::from("."),
                aliases: None
            }
            .job_name(),
            "eau_brute"
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["aep-pg", "eau-brute", "--dir", "/data"]).unwrap();
        match cli.command {
            Commands::EauBrute { dir, aliases } => {
                assert_eq!(dir, PathBuf::from("/data"));
                assert!(aliases.is_none());
            }
            _ => panic!("mauvaise sous-commande"),
        }
    }

    #[test]
    fn test_cli_global_connection_overrides() {
        let cli = Cli::try_parse_from([
            "aep-pg",
            "init-schema",
            "--host",
            "db.example.org",
            "--port",
            "5433",
        ])
        .unwrap();

        let mut config = DatabaseConfig::default();
        apply_target_overrides(&mut config, &cli.target);
        assert_eq!(config.host, "db.example.org");
        assert_eq!(config.port, 5433);
    }

    #[test]
    fn test_apply_source_overrides() {
        let args = SourceArgs {
            src_database: Some("aep_eaurizon".to_string()),
            ..Default::default()
        };
        let mut config = DatabaseConfig::default();
        apply_source_overrides(&mut config, &args);
        assert_eq!(config.dbname, "aep_eaurizon");
    }
}
