use anyhow::Result;
use courier_application::{CommandCatalog, SessionManager};
use courier_core::protocol::Implementation;
use courier_core::session::ConversationStore;
use courier_execution::EchoExecutionFactory;
use courier_infrastructure::{ConfigService, FileConversationStore, UpdateStorage};
use courier_server::{Server, ServerOptions};
use std::sync::Arc;
use std::time::Duration;

/// How the serve loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The client closed stdin.
    Disconnected,
    /// Ctrl-C. A blocking stdin read may still be outstanding, so the
    /// caller has to end the process instead of waiting on the runtime.
    Interrupted,
}

/// Serves one client on stdin/stdout until it disconnects or Ctrl-C.
pub async fn run(service: ConfigService) -> Result<Exit> {
    let config = service.config();
    let conversations_dir = service.conversations_dir()?;

    let store: Arc<dyn ConversationStore> = Arc::new(FileConversationStore::new(&conversations_dir));
    let storage = if config.storage.persist_updates {
        let dir = service.sessions_dir()?;
        tracing::info!("Recording session updates in {}", dir.display());
        Some(Arc::new(UpdateStorage::new(dir)))
    } else {
        tracing::info!("Session update recording disabled");
        None
    };

    let factory = Arc::new(EchoExecutionFactory::new(
        Some(store.clone()),
        Duration::from_millis(config.agent.chunk_delay_ms),
    ));
    let commands = CommandCatalog::new(config.commands.clone());
    tracing::info!(
        "Starting agent with {} slash command(s), conversations in {}",
        commands.len(),
        conversations_dir.display()
    );

    let server = Server::new(
        tokio::io::stdout(),
        ServerOptions {
            agent_info: Implementation {
                name: config.agent.name.clone(),
                title: Some(config.agent.title.clone()),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            sessions: Arc::new(SessionManager::new(factory, Some(store))),
            storage,
            commands,
        },
    );

    let outcome = tokio::select! {
        result = server.run(tokio::io::stdin()) => result.map(|()| Exit::Disconnected),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(Exit::Interrupted)
        }
    };

    settle(outcome, server.shutdown().await)
}

/// Combines the serve result with the shutdown result.
///
/// An interrupt always reports `Interrupted` so the caller still exits the
/// process when storage fails to close.
fn settle(outcome: courier_core::Result<Exit>, shutdown: courier_core::Result<()>) -> Result<Exit> {
    let outcome = outcome?;
    if let Err(e) = shutdown {
        tracing::error!("Shutdown failed: {}", e);
        if outcome == Exit::Disconnected {
            return Err(e.into());
        }
    }
    Ok(outcome)
}
