use anyhow::{Context, Result};
use std::{path::PathBuf, time::Duration};

use crate::audio::session::MAX_VOLUME;

/// Credenciales de un nodo Lavalink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
}

impl NodeConfig {
    pub fn rest_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/v4/websocket", scheme, self.host, self.port)
    }

    /// `nombre@host:puerto:password[:secure]`
    fn parse(entry: &str) -> Result<Self> {
        let (name, rest) = entry
            .split_once('@')
            .with_context(|| format!("Nodo sin nombre: {}", entry))?;
        let mut parts = rest.splitn(4, ':');
        let host = parts.next().unwrap_or_default();
        let port = parts
            .next()
            .with_context(|| format!("Nodo sin puerto: {}", entry))?
            .parse()
            .with_context(|| format!("Puerto inválido en {}", entry))?;
        let password = parts
            .next()
            .with_context(|| format!("Nodo sin password: {}", entry))?;
        let secure = match parts.next() {
            None => false,
            Some(flag) => flag
                .parse()
                .with_context(|| format!("Flag secure inválido en {}", entry))?,
        };

        if name.trim().is_empty() || host.trim().is_empty() {
            anyhow::bail!("Nodo mal formado: {}", entry);
        }

        Ok(Self {
            name: name.trim().to_string(),
            host: host.trim().to_string(),
            port,
            password: password.to_string(),
            secure,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Nodos de audio
    pub nodes: Vec<NodeConfig>,
    pub node_reconnect_delay: Duration,

    // Reproducción
    pub default_volume: u16,
    pub max_queue_size: usize,
    pub enable_autoplay: bool,

    // Controles y letras
    pub control_timeout_ceiling: Duration,
    pub lyrics_refresh_interval: Duration,
    pub lyrics_cache_ttl: Duration,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        std::fs::create_dir_all(&config.data_dir)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let duration = |key: &str, default: &str| -> Result<Duration> {
            let raw = or(key, default);
            humantime::parse_duration(&raw).with_context(|| format!("{} inválido: {}", key, raw))
        };

        let nodes = match var("LAVALINK_NODES").filter(|s| !s.trim().is_empty()) {
            Some(list) => list
                .split(',')
                .filter(|entry| !entry.trim().is_empty())
                .map(|entry| NodeConfig::parse(entry.trim()))
                .collect::<Result<Vec<_>>>()?,
            None => vec![NodeConfig {
                name: "main".to_string(),
                host: or("LAVALINK_HOST", "localhost"),
                port: or("LAVALINK_PORT", "2333").parse()?,
                password: or("LAVALINK_PASSWORD", "youshallnotpass"),
                secure: or("LAVALINK_SECURE", "false").parse()?,
            }],
        };

        Ok(Self {
            discord_token: var("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            application_id: var("APPLICATION_ID")
                .context("Falta APPLICATION_ID")?
                .parse()?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            nodes,
            node_reconnect_delay: duration("NODE_RECONNECT_DELAY", "5s")?,

            default_volume: or("DEFAULT_VOLUME", "100").parse()?,
            max_queue_size: or("MAX_QUEUE_SIZE", "1000").parse()?,
            enable_autoplay: or("ENABLE_AUTOPLAY", "false").parse()?,

            control_timeout_ceiling: duration("CONTROL_TIMEOUT_CEILING", "10m")?,
            lyrics_refresh_interval: duration("LYRICS_REFRESH_INTERVAL", "3s")?,
            lyrics_cache_ttl: duration("LYRICS_CACHE_TTL", "1h")?,

            data_dir: or("DATA_DIR", "/app/data").into(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            anyhow::bail!("Se necesita al menos un nodo Lavalink");
        }

        if self.default_volume > MAX_VOLUME {
            anyhow::bail!(
                "Default volume must be between 0 and {}, got: {}",
                MAX_VOLUME,
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        for (name, value) in [
            ("NODE_RECONNECT_DELAY", self.node_reconnect_delay),
            ("CONTROL_TIMEOUT_CEILING", self.control_timeout_ceiling),
            ("LYRICS_REFRESH_INTERVAL", self.lyrics_refresh_interval),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        Ok(())
    }

    /// Resumen de la configuración para logs.
    ///
    /// No incluye tokens ni contraseñas de nodos.
    pub fn summary(&self) -> String {
        let nodes = self
            .nodes
            .iter()
            .map(|node| format!("{}@{}:{}", node.name, node.host, node.port))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Nodes: {} (reconexión cada {})\n  \
            Audio: {}% vol, cola máx {}\n  \
            Controles: {} máx, letras cada {}\n  \
            Features: Autoplay={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            nodes,
            humantime::format_duration(self.node_reconnect_delay),
            self.default_volume,
            self.max_queue_size,
            humantime::format_duration(self.control_timeout_ceiling),
            humantime::format_duration(self.lyrics_refresh_interval),
            self.enable_autoplay
        )
    }
}
