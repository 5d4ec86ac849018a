// WebSocket module - the per-connection side of the relay
//
// - handler: upgrade entry point and admission (room key + role from the request target)
// - connection: join, handshake signal, relay loop, and teardown for one socket
// - sending: server message encoding and close frames
// - routes: router assembly and the serve loop
// - metrics: operational HTTP endpoints

mod connection;
mod handler;
mod metrics;
mod routes;
mod sending;

pub use handler::{parse_connect_request, websocket_handler, AdmissionError, ConnectRequest};
pub use metrics::{health_check, metrics_handler};
pub use routes::{create_router, run_server, HEALTH_PATH, METRICS_PATH};
