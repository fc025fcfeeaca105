//! Public interface to the raftkv core library, linked by both the server
//! executable and the client binary.

mod client_table;
mod config;
mod kv;
mod log;
mod message;
mod persistence;
mod replica;
mod transport;
pub mod utils;

pub use client_table::{ClientTable, PendingQueue, PendingRequest};
pub use config::{client_config_from_str, replica_config_from_str, ClientConfig, ReplicaConfig};
pub use kv::KvStore;
pub use log::{Command, Entry, Log};
pub use message::{Body, ClientId, Message, ReplicaId, RequestId, BROADCAST_ID};
pub use persistence::{NullPersistence, PersistenceHook};
pub use replica::{Replica, Role};
pub use transport::{ChannelTransport, Transport, UdpTransport};
pub use utils::{RaftKvError, RaftKvResult};
