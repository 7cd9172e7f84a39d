use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, MessageId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::player::{Channels, PlayOutcome},
    bot::MusicRuntime,
    storage::SettingsStore,
    ui::{
        buttons::ControlAction,
        controls::{ControlReply, ControlSurface, Presser},
        embeds,
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicRuntime,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "stop" => handle_stop(ctx, &command, guild_id, bot).await?,
        "autoplay" => handle_autoplay(ctx, &command, guild_id, bot).await?,
        _ => reply_ephemeral(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

/// Maneja las pulsaciones del panel de control
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicRuntime,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    let Some(action) = ControlAction::from_custom_id(&component.data.custom_id) else {
        warn!("🔘 Componente desconocido: {}", component.data.custom_id);
        return Ok(());
    };

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let presser = Presser {
        user_id: component.user.id,
        voice_channel: user_voice_channel(ctx, guild_id, component.user.id),
    };
    let responder = ComponentResponder {
        ctx,
        component: &component,
    };
    respond_to_press(
        &responder,
        &bot.controls,
        guild_id,
        component.message.id,
        action,
        presser,
    )
    .await
}

/// Canal de respuesta de una pulsación: confirmación inmediata y resultado
#[async_trait]
pub trait PressResponder: Send + Sync {
    async fn defer(&self) -> Result<()>;

    async fn reply(&self, reply: ControlReply) -> Result<()>;
}

struct ComponentResponder<'a> {
    ctx: &'a Context,
    component: &'a ComponentInteraction,
}

#[async_trait]
impl PressResponder for ComponentResponder<'_> {
    async fn defer(&self) -> Result<()> {
        self.component
            .create_response(
                &self.ctx.http,
                CreateInteractionResponse::Defer(
                    CreateInteractionResponseMessage::new().ephemeral(true),
                ),
            )
            .await?;
        Ok(())
    }

    async fn reply(&self, reply: ControlReply) -> Result<()> {
        let message = match reply {
            ControlReply::Text(text) => EditInteractionResponse::new().content(text),
            ControlReply::Queue(snapshot) => {
                EditInteractionResponse::new().embed(embeds::create_queue_embed(&snapshot))
            }
        };
        self.component.edit_response(&self.ctx.http, message).await?;
        Ok(())
    }
}

/// Discord descarta la interacción si no se confirma en 3s, así que el ack va
/// antes de esperar el lock de la sesión
pub async fn respond_to_press(
    responder: &dyn PressResponder,
    controls: &ControlSurface,
    guild_id: GuildId,
    message_id: MessageId,
    action: ControlAction,
    presser: Presser,
) -> Result<()> {
    responder.defer().await?;
    let reply = controls
        .handle_press(guild_id, message_id, action, presser)
        .await;
    responder.reply(reply).await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicRuntime,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Verificar que el usuario esté en un canal de voz antes de diferir
    let Some(voice) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_ephemeral(ctx, command, "🔇 Debes estar en un canal de voz").await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let channels = Channels {
        voice,
        text: command.channel_id,
    };
    let embed = match bot
        .player
        .play_query(guild_id, query, command.user.id, channels)
        .await
    {
        Ok(PlayOutcome::Queued {
            track,
            position,
            started,
        }) => embeds::create_track_added_embed(&track, position, started),
        Ok(PlayOutcome::PlaylistQueued { name, count, .. }) => {
            embeds::create_playlist_added_embed(&name, count)
        }
        Ok(PlayOutcome::NoResults) => {
            embeds::create_error_embed("Sin resultados", &format!("Nada encontrado para `{}`", query))
        }
        Err(e) => {
            warn!("❌ /play falló en guild {}: {}", guild_id, e);
            embeds::create_error_embed("No se pudo reproducir", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicRuntime,
) -> Result<()> {
    let text = if bot.player.stop(guild_id).await {
        "⏹️ Reproducción detenida"
    } else {
        "❌ No hay nada reproduciéndose"
    };
    reply_ephemeral(ctx, command, text).await
}

async fn handle_autoplay(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicRuntime,
) -> Result<()> {
    let enabled = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "enabled")
        .and_then(|opt| opt.value.as_bool())
        .ok_or_else(|| anyhow::anyhow!("Opción 'enabled' no proporcionada"))?;

    bot.storage.set_autoplay(guild_id, enabled).await?;

    let embed = embeds::create_success_embed(
        "Autoplay",
        if enabled {
            "📻 Autoplay activado"
        } else {
            "Autoplay desactivado"
        },
    );
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

// Funciones auxiliares

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{track, Harness, GUILD, VOICE};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingResponder {
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PressResponder for RecordingResponder {
        async fn defer(&self) -> Result<()> {
            self.log.lock().push("defer".into());
            Ok(())
        }

        async fn reply(&self, reply: ControlReply) -> Result<()> {
            let entry = match reply {
                ControlReply::Text(text) => text,
                ControlReply::Queue(_) => "cola".into(),
            };
            self.log.lock().push(entry);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_press_is_acknowledged_before_session_lock() {
        let harness = Harness::builder().build();
        let handle = harness.playing(&[track("a", 180_000)]).await;
        let responder = Arc::new(RecordingResponder::default());

        // Otra tarea retiene la sesión, como el dispatcher durante un autoplay
        let held = handle.lock().await;

        let task = {
            let responder = Arc::clone(&responder);
            let controls = Arc::clone(&harness.controls);
            tokio::spawn(async move {
                let presser = Presser {
                    user_id: UserId::new(5),
                    voice_channel: Some(VOICE),
                };
                respond_to_press(
                    responder.as_ref(),
                    &controls,
                    GUILD,
                    MessageId::new(1),
                    ControlAction::Skip,
                    presser,
                )
                .await
            })
        };

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*responder.log.lock(), vec!["defer".to_string()]);

        drop(held);
        task.await.unwrap().unwrap();

        let log = responder.log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "defer");
    }
}
