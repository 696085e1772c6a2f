//! Raw socket plumbing for unix platforms.

use nix::libc;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::IpAddr;
use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;

/// Make a non-blocking raw socket for ICMPv4.
///
/// This requires the `CAP_NET_RAW` capability on Linux.
pub fn make_icmp_socket_v4() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Make a non-blocking raw socket for ICMPv6.
pub fn make_icmp_socket_v6() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

// `libc` does not expose Linux's `struct icmp6_filter` / `ICMP6_FILTER`
// (see <linux/icmpv6.h>); bind them locally with the fixed kernel ABI layout.
#[repr(C)]
struct Icmp6Filter {
    icmp6_filt: [u32; 8],
}
const ICMP6_FILTER: libc::c_int = 1;

/// Install an ICMPv6 type filter passing only the replies we correlate:
/// Echo Reply, Destination Unreachable, Packet Too Big and Time Exceeded.
///
/// The kernel filter is a 256-bit block list; a set bit blocks the type.
#[allow(unsafe_code)]
pub fn set_icmpv6_filter(socket: &Socket) -> io::Result<()> {
    const PASS_TYPES: [u32; 4] = [
        129, // Echo Reply
        1,   // Destination Unreachable
        2,   // Packet Too Big
        3,   // Time Exceeded
    ];
    let mut filter = Icmp6Filter {
        icmp6_filt: [u32::MAX; 8],
    };
    for icmp_type in PASS_TYPES {
        filter.icmp6_filt[(icmp_type >> 5) as usize] &= !(1 << (icmp_type & 31));
    }
    // Safety: the filter struct lives for the duration of the call and the
    // length argument matches its size.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_ICMPV6,
            ICMP6_FILTER,
            std::ptr::addr_of!(filter).cast(),
            std::mem::size_of::<Icmp6Filter>() as libc::socklen_t,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Is the socket readable within `timeout`?
pub fn is_readable(socket: &Socket, timeout: Duration) -> io::Result<bool> {
    let mut fds = [PollFd::new(socket.as_fd(), PollFlags::POLLIN)];
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let ready = poll(&mut fds, PollTimeout::from(millis)).map_err(io::Error::from)?;
    Ok(ready > 0)
}

/// `recv_from` into an initialized byte buffer.
///
/// `socket2::Socket::recv_from` takes `&mut [MaybeUninit<u8>]`; the
/// implementation never writes uninitialized bytes, so viewing an
/// initialized buffer that way is sound.
#[allow(unsafe_code)]
pub fn recv_from(socket: &Socket, buf: &mut [u8]) -> io::Result<(usize, Option<IpAddr>)> {
    // Safety: see above; `recv` does not de-initialize the buffer.
    let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
    let (len, addr) = socket.recv_from(uninit)?;
    Ok((len, addr.as_socket().map(|addr| addr.ip())))
}
