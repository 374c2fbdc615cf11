use anyhow::{Context, Result};
use courier_core::protocol::SessionId;
use courier_infrastructure::{ConfigService, UpdateStorage};

pub async fn show(service: &ConfigService, session_id: &str) -> Result<()> {
    let storage = UpdateStorage::new(service.sessions_dir()?);
    let rows = storage
        .read_updates(&SessionId::new(session_id))
        .await
        .with_context(|| format!("reading updates for session {session_id}"))?;

    if rows.is_empty() {
        eprintln!("No stored updates for session {session_id}");
    }
    for row in rows {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

pub async fn delete(service: &ConfigService, session_id: &str) -> Result<()> {
    let storage = UpdateStorage::new(service.sessions_dir()?);
    storage.delete(&SessionId::new(session_id)).await?;
    println!("Deleted update log for session {session_id}");
    Ok(())
}
