//! DAP session + session manager: tunneling DAP traffic through the
//! LSP channel.

mod envelope;
mod session;
mod session_manager;

pub use envelope::{session_id_of, tunnel_method, unwrap, wrap, REGISTRATION_METHOD};
pub use session::DapSession;
pub use session_manager::{registration_predicate, sinks, traffic_predicate, SessionManager};
