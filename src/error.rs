use thiserror::Error;

/// Errores de comunicación con un nodo de audio remoto.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("el nodo {0} no tiene sesión activa")]
    NotConnected(String),

    #[error("no hay nodos de audio conectados")]
    NoNodeAvailable,

    #[error("error de transporte: {0}")]
    Transport(String),

    #[error("respuesta inválida del nodo: {0}")]
    Protocol(String),

    #[error("el nodo rechazó la petición ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// El nodo respondió pero no pudo cargar el identificador
    #[error("la carga falló: {0}")]
    LoadFailed(String),
}

impl From<reqwest::Error> for NodeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NodeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Errores al publicar, editar o borrar mensajes del chat.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// El mensaje fue borrado por alguien más; se trata como benigno.
    #[error("el mensaje ya no existe")]
    Gone,

    #[error("faltan permisos para escribir en el canal")]
    MissingPermissions,

    #[error("error de Discord: {0}")]
    Http(String),
}

/// Errores al convertir una búsqueda en tracks reproducibles.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("la carga falló: {0}")]
    LoadFailed(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Errores de las operaciones de sesión expuestas a la capa de comandos.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no hay una sesión activa en este servidor")]
    NoSession,

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("no se pudo conectar al canal de voz: {0}")]
    Voice(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Errores del proveedor de letras.
#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("el proveedor respondió {0}")]
    Status(u16),
}
