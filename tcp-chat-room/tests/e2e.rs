use std::{net::SocketAddr, path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const PROMPT: &str = "Please enter your username: ";
const BANNER: &str = "chat room listening on ";

#[tokio::test]
async fn binary_serves_chat_over_tcp() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("tcp-chat-room");

    let (mut server, mut stdout) = spawn_server(&binary).await?;
    let addr = read_listen_addr(&mut stdout).await?;

    // Drain additional server logs in the background so the pipe never fills.
    let log_task = tokio::spawn(async move {
        drain_stdout(stdout).await;
    });

    let mut alice = connect(&addr, "alice").await?;
    assert_eq!(
        read_line_expect(&mut alice, "alice join notice").await?,
        "System: *alice joined*"
    );

    let mut bob = connect(&addr, "bob").await?;
    assert_eq!(
        read_line_expect(&mut bob, "bob join notice").await?,
        "System: *bob joined*"
    );
    assert_eq!(
        read_line_expect(&mut alice, "alice sees bob").await?,
        "System: *bob joined*"
    );

    bob.get_mut()
        .write_all(b"Hi Alice!\n")
        .await
        .context("bob send line")?;
    assert_eq!(
        read_line_expect(&mut alice, "alice hears bob").await?,
        "bob: Hi Alice!"
    );
    assert_eq!(
        read_line_expect(&mut bob, "bob echo").await?,
        "bob: Hi Alice!"
    );

    drop(bob);
    assert_eq!(
        read_line_expect(&mut alice, "alice sees bob leave").await?,
        "System: *bob left*"
    );

    // The server stays up after clients disconnect; terminate it manually.
    let _ = server.kill().await;
    let _ = server.wait().await;
    let _ = log_task.await;

    Ok(())
}

async fn spawn_server(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_listen_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let mut line = String::new();
    let bytes = timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| anyhow!("timed out waiting for listening banner"))??;
    if bytes == 0 {
        return Err(anyhow!("server exited before printing its address"));
    }
    let addr = line
        .split_once(BANNER)
        .map(|(_, addr)| addr.trim())
        .with_context(|| format!("unexpected server banner: {}", line.trim()))?;
    addr.parse::<SocketAddr>()
        .with_context(|| format!("server banner has no socket address: {addr}"))?;
    Ok(addr.to_string())
}

async fn connect(addr: &str, name: &str) -> Result<BufReader<TcpStream>> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect {name}"))?;
    let mut stream = BufReader::new(stream);

    let mut prompt = vec![0; PROMPT.len()];
    timeout(READ_TIMEOUT, stream.read_exact(&mut prompt))
        .await
        .map_err(|_| anyhow!("timed out waiting for prompt"))??;
    if prompt != PROMPT.as_bytes() {
        return Err(anyhow!(
            "unexpected prompt: {:?}",
            String::from_utf8_lossy(&prompt)
        ));
    }

    stream
        .get_mut()
        .write_all(format!("{name}\n").as_bytes())
        .await?;
    Ok(stream)
}

async fn read_line_expect(stream: &mut BufReader<TcpStream>, description: &str) -> Result<String> {
    let mut line = String::new();
    let bytes = timeout(READ_TIMEOUT, stream.read_line(&mut line))
        .await
        .map_err(|_| anyhow!("{description}: timed out waiting for line"))?
        .with_context(|| format!("{description}: failed to read line"))?;
    if bytes == 0 {
        return Err(anyhow!("{description}: stream closed"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while let Ok(bytes) = reader.read_line(&mut buffer).await {
        if bytes == 0 {
            break;
        }
        buffer.clear();
    }
}
