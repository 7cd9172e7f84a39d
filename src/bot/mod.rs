//! # Bot Module
//!
//! Discord front end: slash command registration, interaction routing and
//! gateway events. Playback itself lives in [`crate::audio`]; this module
//! only translates Discord interactions into calls on the player and the
//! control surface.
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]; the playback pieces
//! live in a [`MusicRuntime`] stored in the client's data map:
//!
//! - the [`MusicPlayer`] session registry
//! - the [`ControlSurface`] that answers panel buttons
//! - the [`JsonStorage`] settings store
//! - the [`LyricsService`] whose cache the maintenance task sweeps

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::player::MusicPlayer, config::Config, lyrics::LyricsService, storage::JsonStorage,
    ui::controls::ControlSurface,
};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Estado compartido de reproducción, guardado en el data map del cliente.
///
/// El messenger necesita el HTTP y la caché del cliente, que solo existen una
/// vez construido, así que el runtime se inserta después.
pub struct MusicRuntime {
    pub storage: Arc<Mutex<JsonStorage>>,
    pub player: Arc<MusicPlayer>,
    pub controls: Arc<ControlSurface>,
    pub lyrics: Arc<LyricsService>,
}

impl TypeMapKey for MusicRuntime {
    type Value = Arc<MusicRuntime>;
}

async fn runtime(ctx: &Context) -> Option<Arc<MusicRuntime>> {
    let runtime = ctx.data.read().await.get::<MusicRuntime>().cloned();
    if runtime.is_none() {
        warn!("⚠️ Runtime de música aún no disponible");
    }
    runtime
}

/// Main Discord event handler.
pub struct MusicBot {
    config: Arc<Config>,
    /// `ready` se repite en cada reconexión del gateway
    background_started: AtomicBool,
}

impl MusicBot {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            background_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash en Discord.
    ///
    /// Los comandos de guild se propagan en segundos (desarrollo); los globales
    /// pueden tardar hasta una hora.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        let Some(runtime) = runtime(&ctx).await else {
            return;
        };
        if self.background_started.swap(true, Ordering::SeqCst) {
            return;
        }

        tokio::spawn(events::presence_updater(ctx, runtime.player.subscribe()));
        tokio::spawn(maintenance_tasks(runtime));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(runtime) = runtime(&ctx).await else {
            return;
        };
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, &runtime).await
                {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) =
                    handlers::handle_component(&ctx, component_interaction, &runtime).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Limpia la sesión cuando otro saca al bot del canal de voz
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        if old.is_some() && new.channel_id.is_none() {
            let Some(runtime) = runtime(&ctx).await else {
                return;
            };
            // Tras nuestro propio teardown la sesión ya no existe y esto no hace nada
            if runtime.player.stop(guild_id).await {
                info!("🔌 Bot desconectado en guild {}, sesión cerrada", guild_id);
            }
        }
    }
}

/// Mantenimiento cada hora: limpieza de la caché de letras y estadísticas
async fn maintenance_tasks(runtime: Arc<MusicRuntime>) {
    let MusicRuntime {
        storage,
        player,
        lyrics,
        ..
    } = runtime.as_ref();
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);

    loop {
        interval.tick().await;

        lyrics.cache().cleanup_old_entries();
        let metrics = lyrics.cache().metrics();
        info!(
            "📈 Cache de letras: {} entradas, {:.0}% aciertos",
            lyrics.cache().len(),
            metrics.hit_rate() * 100.0
        );

        info!("🎧 Sesiones activas: {}", player.session_count());
        for supervisor in player.nodes().iter() {
            let status = supervisor.status();
            info!(
                "🛰️ Nodo {}: {:?} ({} intentos)",
                supervisor.name(),
                status.state,
                status.attempts
            );
        }

        match storage.lock().await.get_storage_stats().await {
            Ok(stats) => info!("💾 {}", stats),
            Err(e) => warn!("Error leyendo estadísticas de almacenamiento: {:?}", e),
        }

        info!("🧹 Tareas de mantenimiento completadas");
    }
}
