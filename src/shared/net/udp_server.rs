use crate::shared::log;
use crate::shared::net::traits::*;
use crate::shared::{dns, thread_pool};
use socket2::{Domain, Protocol, Socket, Type};
use std::sync::{atomic, Arc};
use std::{io, net, time};

/// A single UDP datagram received on a listening socket. Implements
/// [DnsRead] by reading directly from the bytes read from the request.
pub struct UdpRequest<'a>(&'a [u8]);

impl<'a> DnsRead for UdpRequest<'a> {
    fn read(self) -> DnsReadResult {
        let req = dns::Message::decode_from_bytes(self.0);
        let err = match req {
            Ok(req) => return DnsReadResult::FullMessage(req),
            Err(err) => err,
        };
        match dns::Header::decode_from_bytes(self.0) {
            Ok(v) => DnsReadResult::HeaderOnly(v, err),
            Err(err_h) => DnsReadResult::ParseErr(err, err_h),
        }
    }
}

/// A wrapper around the socket and the address to be used to respond to a
/// UDP request. Implements [DnsWrite], writing directly into the socket.
/// Responses larger than 4096 octets (the advertised EDNS payload size) are
/// truncated with the TC bit set rather than fragmented.
pub struct UdpResponse {
    socket: net::UdpSocket,
    addr: net::SocketAddr,
}

impl DnsWrite for UdpResponse {
    fn reply(self, response: dns::Message) -> io::Result<()> {
        let resp_bytes = response
            .encode_to_bytes_trunc(dns::EDNS_ADVERTISED_PAYLOAD_SIZE as usize)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", err)))?;
        let mut written = 0;
        while written < resp_bytes.len() {
            let n = self.socket.send_to(&resp_bytes[written..], self.addr)?;
            written += n;
        }
        Ok(())
    }
}

/// Parameters to be used when starting the UDP servers with
/// [crate::shared::net::start_servers].
#[derive(Clone)]
pub struct UdpParams {
    pub address: String,
    pub address_v6: String,
    pub port: u16,
    pub write_timeout: time::Duration,
    pub threads: usize,
}

/// Starts the IPv4 UDP server: binds `AF_INET` on all IPv4 interfaces and
/// loops receiving datagrams, dispatching each to a thread pool worker.
pub fn start_udp_server_v4<H: DnsHandler>(handler: Arc<H>, params: UdpParams, stop: &atomic::AtomicBool) {
    let socket = match setup_v4_socket(&params) {
        Ok(v) => {
            log::info!("Starting UDP IPv4 server, address: '{}:{}'.", &params.address, params.port);
            v
        }
        Err(err) => {
            log::error!("Cannot setup IPv4 socket: {}", err);
            return;
        }
    };
    receive_loop(handler, socket, params, stop, "udp-v4");
}

/// Starts the IPv6 UDP server: binds `AF_INET6` with the IPv6-only option
/// enabled on all IPv6 interfaces, so it never shadows the IPv4 listener.
/// If the option cannot be set, this is logged and the socket is used
/// as-is (per the transport design, this is not a fatal error).
pub fn start_udp_server_v6<H: DnsHandler>(handler: Arc<H>, params: UdpParams, stop: &atomic::AtomicBool) {
    let socket = match setup_v6_socket(&params) {
        Ok(v) => {
            log::info!(
                "Starting UDP IPv6 server, address: '[{}]:{}'.",
                &params.address_v6,
                params.port
            );
            v
        }
        Err(err) => {
            log::error!("Cannot setup IPv6 socket: {}", err);
            return;
        }
    };
    receive_loop(handler, socket, params, stop, "udp-v6");
}

fn receive_loop<H: DnsHandler>(
    handler: Arc<H>,
    socket: net::UdpSocket,
    params: UdpParams,
    stop: &atomic::AtomicBool,
    label: &str,
) {
    let threads_pool = thread_pool::ThreadPool::new(params.threads, label);

    loop {
        let mut buffer = [0; dns::MAX_UDP_LEN_BYTES];
        let (n_read, src_addr) = match socket.recv_from(&mut buffer) {
            Ok(read_data) => read_data,
            Err(err) => {
                log::warn!("[{}] Cannot recv_from socket: {}", label, err);
                continue;
            }
        };

        if stop.load(atomic::Ordering::SeqCst) {
            drop(threads_pool);
            return;
        }

        let socket_clone = match socket.try_clone() {
            Ok(socket) => socket,
            Err(err) => {
                log::warn!("[{}] Cannot clone socket: {}", label, err);
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        threads_pool.execute(move || {
            let request = UdpRequest(&buffer[0..n_read]);
            let response = UdpResponse {
                socket: socket_clone,
                addr: src_addr,
            };
            handler.handle_request(request, response);
        });
    }
}

fn setup_v4_socket(params: &UdpParams) -> Result<net::UdpSocket, io::Error> {
    let listen_address: (&str, u16) = (&params.address, params.port);
    let socket = net::UdpSocket::bind(listen_address)?;
    socket.set_write_timeout(Some(params.write_timeout))?;
    Ok(socket)
}

fn setup_v6_socket(params: &UdpParams) -> Result<net::UdpSocket, io::Error> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    if let Err(err) = socket.set_only_v6(true) {
        log::warn!("Cannot set IPV6_V6ONLY, continuing anyway: {}", err);
    }
    let addr: net::SocketAddr = format!("[{}]:{}", params.address_v6, params.port)
        .parse()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, format!("{}", err)))?;
    socket.bind(&addr.into())?;
    let socket: net::UdpSocket = socket.into();
    socket.set_write_timeout(Some(params.write_timeout))?;
    Ok(socket)
}
