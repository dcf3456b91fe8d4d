//! Thin abstractions over `mio`'s non-blocking sockets, generalized from `rask`'s
//! `TcpListener`/`TcpStream` traits so the engine can be exercised against fakes in tests
//! without dragging real sockets into every unit test.

pub mod tcp_listener;
pub mod tcp_stream;
