//! Node connection supervision.
//!
//! Each configured node gets a [`NodeSupervisor`] that tracks its link state
//! and runs the reconnect loop: a fixed delay between attempts, retried until
//! one succeeds.

use parking_lot::RwLock;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    audio::{node::NodeLink, player::PlayerEvent},
    error::NodeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub state: LinkState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub struct NodeSupervisor {
    link: Arc<dyn NodeLink>,
    delay: Duration,
    status: RwLock<NodeStatus>,
    reconnecting: AtomicBool,
    events: broadcast::Sender<PlayerEvent>,
}

impl NodeSupervisor {
    pub fn new(
        link: Arc<dyn NodeLink>,
        delay: Duration,
        events: broadcast::Sender<PlayerEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            link,
            delay,
            status: RwLock::new(NodeStatus {
                state: LinkState::Disconnected,
                attempts: 0,
                last_error: None,
            }),
            reconnecting: AtomicBool::new(false),
            events,
        })
    }

    pub fn name(&self) -> &str {
        self.link.name()
    }

    pub fn link(&self) -> Arc<dyn NodeLink> {
        Arc::clone(&self.link)
    }

    pub fn status(&self) -> NodeStatus {
        self.status.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.read().state == LinkState::Connected
    }

    /// Primer intento de conexión; si falla entra en el ciclo de reconexión
    pub async fn connect(self: &Arc<Self>) {
        match self.link.connect().await {
            Ok(()) => self.confirm_connected(),
            Err(e) => {
                self.record_failure(&e);
                self.schedule_reconnect();
            }
        }
    }

    pub fn on_disconnect(self: &Arc<Self>, reason: &str) {
        warn!("🔌 Nodo {} desconectado: {}", self.name(), reason);
        {
            let mut status = self.status.write();
            status.state = LinkState::Disconnected;
            status.last_error = Some(reason.to_string());
        }
        self.schedule_reconnect();
    }

    /// Arranca el ciclo de reconexión salvo que ya haya uno en curso
    pub fn schedule_reconnect(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.reconnect_loop().await }))
    }

    async fn reconnect_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.delay).await;

            let attempt = {
                let mut status = self.status.write();
                status.attempts += 1;
                status.attempts
            };
            info!("🔄 Reconectando al nodo {} (intento {})", self.name(), attempt);

            match self.link.connect().await {
                Ok(()) => {
                    // Liberar el flag antes de marcar el nodo
                    self.reconnecting.store(false, Ordering::SeqCst);
                    self.confirm_connected();
                    return;
                }
                Err(e) => {
                    self.record_failure(&e);
                    error!(
                        "❌ Reconexión al nodo {} falló, reintentando en {:?}",
                        self.name(),
                        self.delay
                    );
                }
            }
        }
    }

    /// Marca el nodo conectado y revisa que el enlace no haya caído entretanto
    fn confirm_connected(self: &Arc<Self>) {
        self.mark_connected();
        if !self.link.is_alive() {
            self.on_disconnect("el enlace cayó al reconectar");
        }
    }

    pub fn mark_connected(&self) {
        {
            let mut status = self.status.write();
            status.state = LinkState::Connected;
            status.attempts = 0;
            status.last_error = None;
        }
        info!("✅ Nodo {} conectado", self.name());
        let _ = self.events.send(PlayerEvent::NodeConnect {
            node: self.name().to_string(),
        });
    }

    fn record_failure(&self, err: &NodeError) {
        warn!("⚠️ Nodo {}: {}", self.name(), err);
        let mut status = self.status.write();
        status.state = LinkState::Disconnected;
        status.last_error = Some(err.to_string());
    }
}

/// Conjunto de nodos configurados
pub struct NodePool {
    supervisors: Vec<Arc<NodeSupervisor>>,
}

impl NodePool {
    pub fn new(supervisors: Vec<Arc<NodeSupervisor>>) -> Self {
        Self { supervisors }
    }

    /// Primer nodo conectado, en orden de configuración
    pub fn pick(&self) -> Result<Arc<dyn NodeLink>, NodeError> {
        self.supervisors
            .iter()
            .find(|supervisor| supervisor.is_connected())
            .map(|supervisor| supervisor.link())
            .ok_or(NodeError::NoNodeAvailable)
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<NodeSupervisor>> {
        self.supervisors
            .iter()
            .find(|supervisor| supervisor.name() == name)
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeSupervisor>> {
        self.supervisors.iter()
    }

    /// Conecta todos los nodos en segundo plano
    pub fn connect_all(&self) {
        for supervisor in &self.supervisors {
            let supervisor = Arc::clone(supervisor);
            tokio::spawn(async move { supervisor.connect().await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNode;

    const DELAY: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_on_fixed_delay_until_success() {
        let node = FakeNode::new("main");
        node.fail_connects(2);
        let (events, mut rx) = broadcast::channel(16);
        let supervisor = NodeSupervisor::new(node.clone(), DELAY, events);
        supervisor.mark_connected();
        let _ = rx.recv().await;

        supervisor.on_disconnect("socket cerrado");
        // Un segundo aviso mientras reconecta no duplica el ciclo
        assert!(supervisor.schedule_reconnect().is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;

        let attempts = node.connect_instants();
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= DELAY);
        }
        assert!(supervisor.is_connected());
        assert_eq!(supervisor.status().attempts, 0);
        assert!(matches!(rx.recv().await, Ok(PlayerEvent::NodeConnect { .. })));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(node.connect_instants().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_lost_right_after_reconnect_schedules_again() {
        let node = FakeNode::new("main");
        node.drop_after_connect(1);
        let (events, _rx) = broadcast::channel(16);
        let supervisor = NodeSupervisor::new(node.clone(), DELAY, events);
        supervisor.mark_connected();

        supervisor.on_disconnect("socket cerrado");
        tokio::time::sleep(Duration::from_secs(60)).await;

        // La primera reconexión cae enseguida y se agenda otra
        assert_eq!(node.connect_instants().len(), 2);
        assert!(supervisor.is_connected());
        assert!(supervisor.schedule_reconnect().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_picks_first_connected_node() {
        let (events, _rx) = broadcast::channel(16);
        let a = NodeSupervisor::new(FakeNode::new("a"), DELAY, events.clone());
        let b = NodeSupervisor::new(FakeNode::new("b"), DELAY, events);
        let pool = NodePool::new(vec![a, b.clone()]);

        assert!(matches!(pool.pick(), Err(NodeError::NoNodeAvailable)));

        b.mark_connected();
        assert_eq!(pool.pick().map(|link| link.name().to_string()).ok(), Some("b".into()));
        assert!(pool.by_name("a").is_some());
    }
}
