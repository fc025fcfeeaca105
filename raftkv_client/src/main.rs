//! A small interactive/scriptable test client: reads `get <key>` / `put
//! <key> <value>` lines from stdin, follows `redirect` replies to find the
//! leader, retries on timeout, and prints each reply (§4.6, §6).

use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::Parser;

use raftkv::{client_config_from_str, Body, Message, ReplicaId, Transport, UdpTransport};

#[derive(Parser, Debug)]
#[command(name = "raftkv_client", about = "raftkv interactive test client")]
struct Args {
    /// Local relay port every replica and client talk through.
    port: u16,

    /// This client's id, used as the `src` of every request.
    id: String,

    /// Known replica ids, tried in order until one answers as leader.
    #[arg(required = true)]
    replicas: Vec<ReplicaId>,

    /// Optional TOML string overriding `ClientConfig` fields.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = client_config_from_str(args.config.as_deref())?;
    let transport = UdpTransport::bind(args.port).await?;

    let mut target = args.replicas[0].clone();
    let stdin = io::stdin();
    let mut mid_counter: u64 = 0;

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let body = match parse_command(line) {
            Some(b) => b,
            None => {
                println!("usage: get <key> | put <key> <value>");
                continue;
            }
        };

        mid_counter += 1;
        let mid = format!("{}-{}", args.id, mid_counter);
        let request = with_mid(body, mid.clone());

        let mut tried = 0;
        loop {
            let msg = Message::new(args.id.clone(), target.clone(), target.clone(), request.clone());
            transport.send(&msg).await?;

            match transport
                .recv_timeout(Duration::from_millis(config.retry_backoff_ms))
                .await?
            {
                Some(reply) => match reply.body {
                    Body::Ok { value, .. } => {
                        println!("ok {}", value.unwrap_or_default());
                        break;
                    }
                    Body::Redirect { .. } => {
                        target = reply.leader;
                        tried += 1;
                    }
                    Body::Fail { .. } => {
                        println!("fail");
                        break;
                    }
                    other => {
                        log::warn!("unexpected reply body: {:?}", other);
                        tried += 1;
                    }
                },
                None => {
                    tried += 1;
                    let next = (replica_index(&args.replicas, &target) + 1) % args.replicas.len();
                    target = args.replicas[next].clone();
                }
            }

            if tried >= config.max_retries {
                println!("fail (gave up after {} retries)", tried);
                break;
            }
        }
        io::stdout().flush()?;
    }

    Ok(())
}

fn replica_index(replicas: &[ReplicaId], id: &str) -> usize {
    replicas.iter().position(|r| r == id).unwrap_or(0)
}

fn with_mid(body: Body, mid: String) -> Body {
    match body {
        Body::Get { key, .. } => Body::Get { key, mid },
        Body::Put { key, value, .. } => Body::Put { key, value, mid },
        other => other,
    }
}

fn parse_command(line: &str) -> Option<Body> {
    let mut parts = line.splitn(3, ' ');
    match parts.next()? {
        "get" => {
            let key = parts.next()?.to_string();
            Some(Body::Get { key, mid: String::new() })
        }
        "put" => {
            let key = parts.next()?.to_string();
            let value = parts.next()?.to_string();
            Some(Body::Put { key, value, mid: String::new() })
        }
        _ => None,
    }
}
