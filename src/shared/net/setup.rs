use crate::shared::log;
use crate::shared::net::traits::*;
use crate::shared::net::udp_server::*;
use std::sync::{atomic, mpsc, Arc};
use std::{net, thread, time};

/// Setup and start the IPv4 and IPv6 UDP dns servers. Every socket runs its
/// own receive loop in its own thread; when one exits (bind failure or stop
/// signal) the other is torn down too.
pub fn start_servers<H: DnsHandler>(handler: Arc<H>, udp_params: UdpParams) {
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(atomic::AtomicBool::new(false));

    let v4_params = udp_params.clone();
    let handler_clone = Arc::clone(&handler);
    let stop_clone = Arc::clone(&stop);
    let tx_clone = tx.clone();
    thread::spawn(move || {
        start_udp_server_v4(handler_clone, v4_params, &stop_clone);
        log::warn!("UDP IPv4 server shut down.");
        tx_clone.send(()).unwrap();
    });

    let v6_params = udp_params.clone();
    let handler_clone = Arc::clone(&handler);
    let stop_clone = Arc::clone(&stop);
    let tx_clone = tx.clone();
    thread::spawn(move || {
        start_udp_server_v6(handler_clone, v6_params, &stop_clone);
        log::warn!("UDP IPv6 server shut down.");
        tx_clone.send(()).unwrap();
    });

    // Wait for either socket's loop to exit, then signal and wake up both.
    rx.recv().unwrap();
    stop.store(true, atomic::Ordering::SeqCst);
    wake_up_servers(&udp_params);
    rx.recv_timeout(time::Duration::from_secs(4)).unwrap();
}

/// Dirty hack. The only way to interrupt a blocking UDP 'recv_from' call is
/// sending it a datagram. Without this the receive loops cannot unblock and
/// check the stop signal (and so exit properly).
#[allow(unused_must_use)]
fn wake_up_servers(udp_conf: &UdpParams) {
    match net::UdpSocket::bind("0.0.0.0:0") {
        Ok(sock) => sock.send_to(&[0], (udp_conf.address.as_str(), udp_conf.port)),
        Err(_) => return,
    };
    match net::UdpSocket::bind("[::1]:0") {
        Ok(sock) => sock.send_to(&[0], (udp_conf.address_v6.as_str(), udp_conf.port)),
        Err(_) => return,
    };
}
