//! Session management, fan-out, and presence for the chat relay.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `envelope` | The single wire + bus message type (JSON) |
//! | `session` | Per-connection transport: reader/writer tasks, keepalive, close latch |
//! | `hub` | In-process registry `session_id → Session` with targeted emit and broadcast |
//! | `substrate` | Pub/sub + set-store abstraction; in-memory implementation |
//! | `redis_pubsub` | Redis-backed substrate (production) |
//! | `bus` | Typed envelope publish/subscribe over the shared channel |
//! | `directory` | Cluster-shared `username → {session_id}` presence directory |
//! | `friends` | Read-only friend-list capability |
//! | `relay` | The serialized event loop wiring all of the above together |
//!
//! ## Data Flow
//!
//! wire → `session` inbound queue → `relay` handler → `bus` publish →
//! (every process) `bus` subscription → `relay` delivery → `directory`
//! lookup → `hub` emit → `session` outbound queue → wire.

pub mod bus;
pub mod directory;
pub mod envelope;
pub mod friends;
pub mod hub;
pub mod metrics;
pub mod redis_pubsub;
pub mod relay;
pub mod session;
pub mod substrate;

pub use bus::{BusClient, PublishError};
pub use directory::SessionDirectory;
pub use envelope::{Envelope, Friend, MessageType};
pub use friends::{FriendResolver, StaticFriends};
pub use hub::SessionHub;
pub use redis_pubsub::RedisSubstrate;
pub use relay::{Relay, SessionEvent};
pub use session::Session;
pub use substrate::{MemorySubstrate, Substrate, SubstrateError};
