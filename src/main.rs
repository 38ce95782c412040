use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use framecast::chat::{render_payload, ChatLine};
use framecast::cli::{Cli, ClientArgs, Command, ServerArgs};
use framecast::handler::{Broadcast, Echo};
use framecast::protocol::FramingConfig;
use framecast::transport::Endpoint;
use framecast::{Client, Server, SessionConfig};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
    }
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let endpoint: Endpoint = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen endpoint {:?}", args.listen))?;

    let builder = Server::builder()
        .max_frame_size(args.max_frame_size)
        .byte_order(args.byte_order.into());
    let builder = if args.echo {
        builder.handler(Echo)
    } else if args.exclude_sender {
        builder.handler(Broadcast::excluding_sender())
    } else {
        builder.handler(Broadcast::default())
    };

    let server = builder
        .bind(&endpoint)
        .await
        .with_context(|| format!("failed to bind {endpoint}"))?;
    info!("server listening on {}", server.local_endpoint()?);

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("server exited with error: {err:?}");
        return Err(err.into());
    }
    Ok(())
}

async fn run_client(args: ClientArgs) -> Result<()> {
    let endpoint: Endpoint = args
        .server
        .parse()
        .with_context(|| format!("invalid server endpoint {:?}", args.server))?;
    let config = SessionConfig {
        framing: FramingConfig::default().with_byte_order(args.byte_order.into()),
        ..SessionConfig::default()
    };

    let mut client = Client::connect(&endpoint, config)
        .await
        .with_context(|| format!("failed to connect to {endpoint}"))?;
    info!("connected to {} as {}", endpoint, args.nickname);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            frame = client.recv() => match frame? {
                Some(payload) => write_stdout(&render_payload(&payload)).await?,
                None => {
                    write_stdout("*** server closed the connection").await?;
                    break;
                }
            },
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim_end();
                if text.is_empty() {
                    continue;
                }
                if text.eq_ignore_ascii_case("/quit") {
                    write_stdout("*** leaving chat").await?;
                    break;
                }
                client.send(ChatLine::new(&args.nickname, text).encode()?).await?;
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    if let Err(error) = client.close().await {
        warn!(%error, "failed to shut down the connection cleanly");
    }
    Ok(())
}

async fn write_stdout(line: &str) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
