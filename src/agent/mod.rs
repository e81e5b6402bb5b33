//! Local and remote agents
//!
//! Each agent owns one listener and an accept loop; every accepted
//! connection becomes an independent session task. The running flag is an
//! atomic so stopping never races with acceptance.

mod local;
mod remote;

pub use local::LocalAgent;
pub use remote::RemoteAgent;

use std::net::SocketAddr;

/// Hook invoked once the listener socket is bound
pub type ListenHook = Box<dyn Fn(SocketAddr) + Send + Sync>;
