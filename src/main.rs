use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod lyrics;
mod storage;
#[cfg(test)]
mod testing;
mod ui;

use crate::{
    audio::{
        autoplay::RadioAutoplay,
        dispatcher::Dispatcher,
        lavalink_client::LavalinkNode,
        node::NodeLink,
        player::{MusicPlayer, PlayerOptions, EVENT_CAPACITY},
        resolver::NodeResolver,
        supervisor::{NodePool, NodeSupervisor},
        voice::SongbirdBridge,
    },
    bot::{MusicBot, MusicRuntime},
    cache::lyrics_cache,
    config::Config,
    lyrics::{lrclib::LrclibProvider, LyricsService},
    storage::JsonStorage,
    ui::{controls::ControlSurface, lyrics::LyricsOverlay, messenger::SerenityMessenger},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resonance=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Resonance v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Inicializar almacenamiento JSON
    let storage = Arc::new(Mutex::new(
        JsonStorage::new(config.data_dir.clone(), config.enable_autoplay).await?,
    ));

    // Songbird solo como pasarela de voz
    let songbird = Songbird::serenity();
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(MusicBot::new(Arc::clone(&config)))
        .register_songbird_with(Arc::clone(&songbird))
        .await?;

    let user_id = client.http.get_current_user().await?.id;

    // Nodos Lavalink
    let (node_tx, node_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let supervisors = config
        .nodes
        .iter()
        .map(|node| {
            let link: Arc<dyn NodeLink> =
                Arc::new(LavalinkNode::new(node.clone(), user_id, node_tx.clone()));
            NodeSupervisor::new(link, config.node_reconnect_delay, events.clone())
        })
        .collect();
    let pool = Arc::new(NodePool::new(supervisors));
    info!("🎼 {} nodo(s) Lavalink configurado(s)", config.nodes.len());

    let resolver = Arc::new(NodeResolver::new(Arc::clone(&pool)));
    let messenger = Arc::new(SerenityMessenger::new(
        Arc::clone(&client.http),
        Arc::clone(&client.cache),
    ));
    let player = Arc::new(MusicPlayer::new(
        Arc::clone(&pool),
        Arc::new(SongbirdBridge::new(songbird)),
        resolver.clone(),
        messenger,
        events,
        PlayerOptions {
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
        },
    ));

    // Letras y controles
    let lyrics = Arc::new(LyricsService::new(
        Arc::new(LrclibProvider::new()?),
        lyrics_cache(config.lyrics_cache_ttl),
    ));
    let overlay = LyricsOverlay::new(
        Arc::clone(&player),
        Arc::clone(&lyrics),
        config.lyrics_refresh_interval,
        config.control_timeout_ceiling,
    );
    let controls = Arc::new(ControlSurface::new(
        Arc::clone(&player),
        overlay,
        config.control_timeout_ceiling,
    ));
    let dispatcher = Dispatcher::new(
        Arc::clone(&player),
        Arc::clone(&controls),
        Arc::new(RadioAutoplay::new(resolver)),
        storage.clone(),
    );

    {
        let mut data = client.data.write().await;
        data.insert::<MusicRuntime>(Arc::new(MusicRuntime {
            storage,
            player,
            controls,
            lyrics,
        }));
    }

    tokio::spawn(dispatcher.run(node_rx));
    pool.connect_all();

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("No se pudo registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Comprueba que cada nodo configurado responde a su endpoint de versión
async fn health_check(config: &Config) -> Result<()> {
    let http = reqwest::Client::new();

    for node in &config.nodes {
        let response = http
            .get(format!("{}/version", node.rest_url()))
            .header("Authorization", &node.password)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Nodo {} respondió {}", node.name, response.status());
        }
        let version = response.text().await?;
        println!("{}: {}", node.name, version.trim());
    }

    println!("OK");
    Ok(())
}
