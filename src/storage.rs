use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::{collections::HashMap, path::PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{info, warn};

/// Configuración de servidor almacenada en JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub guild_id: u64,
    pub autoplay: bool,
    pub updated_at: DateTime<Utc>,
}

impl ServerConfig {
    fn new(guild_id: u64, autoplay: bool) -> Self {
        Self {
            guild_id,
            autoplay,
            updated_at: Utc::now(),
        }
    }
}

/// Ajustes por guild que consulta la orquestación
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Autoplay de la guild; ante un error de lectura se usa el valor por defecto
    async fn autoplay(&self, guild_id: GuildId) -> bool;

    async fn set_autoplay(&self, guild_id: GuildId, enabled: bool) -> Result<()>;
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    servers_cache: HashMap<u64, ServerConfig>,
    default_autoplay: bool,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf, default_autoplay: bool) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            servers_cache: HashMap::new(),
            default_autoplay,
        };

        storage.load_all_servers().await?;

        Ok(storage)
    }

    /// Obtiene la configuración de un servidor, creándola si no existe
    pub async fn get_server_config(&mut self, guild_id: u64) -> Result<ServerConfig> {
        if let Some(config) = self.servers_cache.get(&guild_id) {
            return Ok(config.clone());
        }

        match self.load_server_config(guild_id).await {
            Ok(config) => {
                self.servers_cache.insert(guild_id, config.clone());
                Ok(config)
            }
            Err(_) => {
                let config = ServerConfig::new(guild_id, self.default_autoplay);
                self.save_server_config(&config).await?;
                self.servers_cache.insert(guild_id, config.clone());

                info!("📝 Configuración por defecto creada para guild {}", guild_id);
                Ok(config)
            }
        }
    }

    /// Actualiza la configuración de un servidor
    pub async fn update_server_config(&mut self, mut config: ServerConfig) -> Result<()> {
        config.updated_at = Utc::now();
        self.save_server_config(&config).await?;
        info!("💾 Configuración actualizada para guild {}", config.guild_id);
        self.servers_cache.insert(config.guild_id, config);
        Ok(())
    }

    pub async fn set_autoplay(&mut self, guild_id: u64, enabled: bool) -> Result<()> {
        let mut config = self.get_server_config(guild_id).await?;
        config.autoplay = enabled;
        self.update_server_config(config).await
    }

    /// Obtiene estadísticas de almacenamiento
    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        let mut files = fs::read_dir(self.servers_dir()).await?;
        let mut file_count = 0;
        let mut total_size = 0;

        while let Some(entry) = files.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                file_count += 1;
                if let Ok(metadata) = entry.metadata().await {
                    total_size += metadata.len();
                }
            }
        }

        Ok(StorageStats {
            server_configs: file_count,
            cached_configs: self.servers_cache.len(),
            total_size_bytes: total_size,
            data_dir: self.data_dir.clone(),
        })
    }

    async fn load_server_config(&self, guild_id: u64) -> Result<ServerConfig> {
        let content = fs::read_to_string(self.server_file_path(guild_id)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_server_config(&self, config: &ServerConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        fs::write(self.server_file_path(config.guild_id), content).await?;
        Ok(())
    }

    async fn load_all_servers(&mut self) -> Result<()> {
        let mut files = fs::read_dir(self.servers_dir()).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let guild_id = path
                .file_stem()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok());

            if let Some(guild_id) = guild_id {
                match self.load_server_config(guild_id).await {
                    Ok(config) => {
                        self.servers_cache.insert(guild_id, config);
                        loaded_count += 1;
                    }
                    Err(e) => {
                        warn!("Error cargando configuración para guild {}: {}", guild_id, e);
                    }
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {} configuraciones de servidor", loaded_count);
        }

        Ok(())
    }

    fn servers_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }

    fn server_file_path(&self, guild_id: u64) -> PathBuf {
        self.servers_dir().join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl SettingsStore for Mutex<JsonStorage> {
    async fn autoplay(&self, guild_id: GuildId) -> bool {
        let mut storage = self.lock().await;
        match storage.get_server_config(guild_id.get()).await {
            Ok(config) => config.autoplay,
            Err(e) => {
                warn!("⚠️ No se pudo leer la configuración de {}: {}", guild_id, e);
                storage.default_autoplay
            }
        }
    }

    async fn set_autoplay(&self, guild_id: GuildId, enabled: bool) -> Result<()> {
        self.lock().await.set_autoplay(guild_id.get(), enabled).await
    }
}

/// Estadísticas de almacenamiento
#[derive(Debug)]
pub struct StorageStats {
    pub server_configs: usize,
    pub cached_configs: usize,
    pub total_size_bytes: u64,
    pub data_dir: PathBuf,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Storage: {} configs en disco, {} en memoria, {:.2} KB en {}",
            self.server_configs,
            self.cached_configs,
            self.total_size_bytes as f64 / 1024.0,
            self.data_dir.display()
        )
    }
}
