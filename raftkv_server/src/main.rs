//! Replica node executable: parses the launch arguments (§6), brings up a
//! UDP transport, and drives one [`raftkv::Replica`] until Ctrl-C.

use clap::Parser;

use raftkv::{replica_config_from_str, Replica, ReplicaId, UdpTransport};

/// One raftkv replica. Talks to its peers and to clients over UDP
/// datagrams carrying JSON messages (§1, §6).
#[derive(Parser, Debug)]
#[command(name = "raftkv_server", about = "raftkv replica node")]
struct Args {
    /// UDP port this replica (and the local relay forwarding to it) listens on.
    port: u16,

    /// This replica's id.
    id: ReplicaId,

    /// Ids of every other replica in the cluster.
    #[arg(required = true)]
    peers: Vec<ReplicaId>,

    /// Optional TOML string overriding one or more `ReplicaConfig` fields.
    #[arg(long)]
    config: Option<String>,

    /// Log level: error, warn, info, debug, or trace.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&args.log_level),
    )
    .init();

    let config = replica_config_from_str(args.config.as_deref())?;
    let transport = UdpTransport::bind(args.port).await?;
    let mut replica = Replica::new(args.id, args.peers, config, transport);

    replica.start().await?;

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    ctrlc::set_handler(move || {
        if let Some(tx) = tx.take() {
            let _ = tx.send(());
        }
    })?;

    tokio::select! {
        res = replica.run() => res?,
        _ = &mut rx => {
            log::info!("received shutdown signal, exiting");
        }
    }

    Ok(())
}
