//! Binary TCP Protocol
//!
//! The synchronization surface clients speak. Framing and primitives live in
//! [`wire`]; the accept loop, session authentication and opcode dispatch in
//! [`server`]. See the module docs there for the per-operation layouts.

mod server;
pub mod wire;

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;

pub use server::{reply_code, run_tcp_server, Opcode, ReplyCode, TcpState};
