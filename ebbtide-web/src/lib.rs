//! Ebbtide Web - HTTP range streaming over an in-progress torrent.
//!
//! Serves the active torrent's files with partial-content semantics while
//! the swarm is still downloading them: requests wait for torrent
//! readiness, range math is computed against the known file length, and
//! body bytes stream out as the swarm supplies the backing pieces.

pub mod range;
pub mod server;
pub mod stream;

pub use range::{ByteRange, RangeUnsatisfiable, resolve_range};
pub use server::{AppState, ServerError, router, run_server};
