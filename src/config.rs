use std::{path::{Path, PathBuf}, time::Duration};
use serde::{Deserialize, Serialize};

/// Configuration de l'application
///
/// Contient uniquement ce qui est nécessaire au démarrage du bot. Les paramètres propres à
/// chaque serveur (catégories, limites, politique de claim...) sont stockés en base de données.
///
/// Le fichier est lu en JSON, ou en YAML si son extension est `.yml` / `.yaml`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub token: String,
    pub app_id: u64,
    /// URL de connexion sea-orm, par ex. `sqlite://tickets.db?mode=rwc`
    pub database: String,
    /// Store de coordination partagé. En son absence, un store en mémoire est utilisé.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub tickets: EngineConfig,
    #[serde(skip)]
    filepath: PathBuf,
}

/// Paramètres du moteur de tickets
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Temps maximum d'attente du verrou de création par serveur
    pub lock_timeout_ms: u64,
    /// Temps accordé à la libération du verrou, indépendant de la deadline de l'opération
    pub unlock_timeout_ms: u64,
    /// Deadline par défaut d'une opération du cycle de vie
    pub operation_timeout_ms: u64,
    /// Temps accordé aux suites d'une fermeture (webhook, archives, message privé), compté après
    /// la deadline de l'opération
    pub follow_up_timeout_ms: u64,
    /// Nombre de tickets pouvant être ouverts d'affilée par serveur
    pub rate_limit_burst: u32,
    /// Période de régénération d'un jeton du seau
    pub rate_limit_period_ms: u64,
    /// Durée de vie du jeton de rafraîchissement du cache des salons
    pub refresh_token_ttl_ms: u64,
    /// Âge au-delà duquel un ticket en provisionnement est considéré bloqué
    pub provisioning_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Délai avant l'archivage d'un fil, pour esquiver une course côté Discord
    pub thread_archive_delay_ms: u64,
    pub page_ttl_secs: u64,
    /// Dossier où écrire une copie JSON des transcriptions
    pub archive_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 3_000,
            unlock_timeout_ms: 2_000,
            operation_timeout_ms: 15_000,
            follow_up_timeout_ms: 10_000,
            rate_limit_burst: 10,
            rate_limit_period_ms: 6_000,
            refresh_token_ttl_ms: 30_000,
            provisioning_ttl_secs: 300,
            sweep_interval_secs: 60,
            thread_archive_delay_ms: 1_000,
            page_ttl_secs: 900,
            archive_dir: None,
        }
    }
}

impl EngineConfig {
    #[inline]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
    #[inline]
    pub fn unlock_timeout(&self) -> Duration {
        Duration::from_millis(self.unlock_timeout_ms)
    }
    #[inline]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
    #[inline]
    pub fn follow_up_timeout(&self) -> Duration {
        Duration::from_millis(self.follow_up_timeout_ms)
    }
    #[inline]
    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_millis(self.rate_limit_period_ms)
    }
    #[inline]
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_millis(self.refresh_token_ttl_ms)
    }
    #[inline]
    pub fn provisioning_ttl(&self) -> Duration {
        Duration::from_secs(self.provisioning_ttl_secs)
    }
    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
    #[inline]
    pub fn thread_archive_delay(&self) -> Duration {
        Duration::from_millis(self.thread_archive_delay_ms)
    }
    #[inline]
    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.page_ttl_secs)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(filepath: P) -> Result<Self, String> {
        let filepath = filepath.as_ref();
        let str_config = match std::fs::read_to_string(filepath) {
            Ok(v) => v,
            Err(e) => return Err(format!("Impossible de lire le fichier {}: {}", filepath.to_string_lossy(), e)),
        };
        let mut config = Self::parse(&str_config, Self::is_yaml(filepath))
            .map_err(|e| format!("Impossible de lire la configuration {}: {}", filepath.to_string_lossy(), e))?;
        config.filepath = filepath.to_path_buf();
        Ok(config)
    }
    pub fn parse(content: &str, yaml: bool) -> Result<Self, String> {
        if yaml {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        }
    }
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }
    fn is_yaml(filepath: &Path) -> bool {
        matches!(filepath.extension().and_then(|e| e.to_str()), Some("yml") | Some("yaml"))
    }
}
