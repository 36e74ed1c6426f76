//! Listener construction (spec.md §6: "listen backlog = 256").
//!
//! `std::net::TcpListener::bind` has no backlog knob, so the listen
//! call itself goes through `socket2` and is converted back into a
//! plain `std::net::TcpListener` — the type every other module in this
//! crate (worker, supervisor) already expects.

use std::net::{SocketAddr, TcpListener};

use socket2::{Domain, Socket, Type};

use crate::config::LISTEN_BACKLOG;

pub fn bind_listener(addr: &str) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{addr}: {e}")))?;

    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(false)?;
    Ok(socket.into())
}
