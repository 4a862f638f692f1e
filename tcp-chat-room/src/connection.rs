use std::{future::Future, io, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    select,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    coordinator::CoordinatorHandle,
    message::{ChatMessage, read_line, write_message, write_prompt},
    participant::Inbox,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionSettings {
    /// Longest a single read or write may wait before the connection is
    /// treated as dead. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

/// Drives one client from login to teardown.
///
/// Once the participant has joined, `leave` is always sent and the write
/// half shut down, whichever side ended the session.
pub async fn handle_connection<S>(
    stream: S,
    coordinator: CoordinatorHandle,
    settings: ConnectionSettings,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let Some(name) = login(&mut reader, &mut writer, settings).await? else {
        debug!("connection closed before login");
        return Ok(());
    };

    let mut inbox = Inbox::new();
    let participant = inbox.participant(name.clone());
    coordinator.join(participant.clone()).await?;
    info!(name, "participant joined");

    let outcome = run_session(reader, &mut writer, &mut inbox, &name, &coordinator, settings).await;

    if let Err(err) = coordinator.leave(participant).await {
        warn!(name, error = ?err, "failed to announce departure");
    }
    if let Err(err) = writer.shutdown().await {
        debug!(name, error = ?err, "failed to shut down connection cleanly");
    }
    info!(name, "participant left");

    outcome
}

async fn login<R, W>(
    reader: &mut R,
    writer: &mut W,
    settings: ConnectionSettings,
) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    within(settings.idle_timeout, write_prompt(writer))
        .await
        .context("failed to send login prompt")?;
    within(settings.idle_timeout, read_line(reader))
        .await
        .context("failed to read username")
}

async fn run_session<R, W>(
    reader: R,
    writer: &mut W,
    inbox: &mut Inbox,
    name: &str,
    coordinator: &CoordinatorHandle,
    settings: ConnectionSettings,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let mut inbound = tokio::spawn(relay_inbound(
        reader,
        coordinator.clone(),
        name.to_string(),
        settings,
    ));

    let outcome = relay_outbound(writer, inbox, &mut inbound, name, settings).await;
    inbound.abort();
    outcome
}

/// Turns every line from the client into a broadcast.
///
/// Does not return until the coordinator has routed every line already
/// read, so the writer sees them in the inbox once this task is done.
async fn relay_inbound<R>(
    mut reader: R,
    coordinator: CoordinatorHandle,
    name: String,
    settings: ConnectionSettings,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let relayed = relay_lines(&mut reader, &coordinator, &name, settings).await;
    let flushed = coordinator.flush().await;
    relayed.and(flushed)
}

async fn relay_lines<R>(
    reader: &mut R,
    coordinator: &CoordinatorHandle,
    name: &str,
    settings: ConnectionSettings,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = within(settings.idle_timeout, read_line(reader)).await? {
        coordinator.broadcast(ChatMessage::new(name, line)).await?;
    }
    Ok(())
}

/// Writes routed messages to the client until it goes away.
///
/// The reader task finishing is the close signal. It travels outside the
/// inbox, so a full inbox can never hold it back, and it only fires after
/// the coordinator has routed the client's last lines.
async fn relay_outbound<W>(
    writer: &mut W,
    inbox: &mut Inbox,
    inbound: &mut JoinHandle<Result<()>>,
    name: &str,
    settings: ConnectionSettings,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        select! {
            message = inbox.recv() => {
                let Some(message) = message else {
                    return Ok(());
                };
                within(settings.idle_timeout, write_message(writer, &message))
                    .await
                    .context("failed to deliver message")?;
            }
            finished = &mut *inbound => {
                match finished {
                    Ok(Ok(())) => debug!(name, "client closed the connection"),
                    Ok(Err(err)) => debug!(name, error = ?err, "inbound relay stopped"),
                    Err(err) => warn!(name, error = ?err, "inbound relay task failed"),
                }
                while let Some(message) = inbox.try_recv() {
                    within(settings.idle_timeout, write_message(writer, &message))
                        .await
                        .context("failed to flush queued message")?;
                }
                return Ok(());
            }
        }
    }
}

async fn within<F, T>(limit: Option<Duration>, operation: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => timeout(limit, operation)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection idle"))?,
        None => operation.await,
    }
}
