// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the TCP connection to the robot-control server.
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use log::debug;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::exception::{MpcException, MpcResult};
use crate::robot::service_types::{CommandEnum, CommandHeader, RequestWithHeader};

const CLIENT: Token = Token(1);
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

pub trait MessageCommand {
    fn get_command_message_id(&self) -> u32;
}

fn network_exception<E: ToString>(error: E) -> MpcException {
    MpcException::NetworkException {
        message: error.to_string(),
    }
}

/// Blocking request/response connection with a bounded wait for the server and for every
/// response.
pub struct Network {
    tcp_socket: TcpStream,
    timeout: Duration,
    command_id: u32,
    header_size: usize,
    read_buffer: Vec<u8>,
    received_responses: HashMap<u32, Vec<u8>>,
    poll_read: Poll,
    events: Events,
}

impl Network {
    /// Connects to the server. Refused connections are retried until `timeout` has passed.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::MpcException::NetworkException`) if the address
    /// cannot be resolved or the server is not available within `timeout`.
    pub fn new(address: &str, port: u16, timeout: Duration) -> MpcResult<Network> {
        let sock_address = format!("{}:{}", address, port)
            .to_socket_addrs()
            .map_err(network_exception)?
            .next()
            .ok_or_else(|| network_exception(format!("could not resolve {}", address)))?;
        let std_socket = wait_for_server(&sock_address, timeout)?;
        std_socket.set_nodelay(true).map_err(network_exception)?;
        std_socket.set_nonblocking(true).map_err(network_exception)?;
        let mut tcp_socket = TcpStream::from_std(std_socket);
        let fd = tcp_socket.as_raw_fd();

        setsockopt(fd, KeepAlive, &true).map_err(network_exception)?;
        setsockopt(fd, TcpKeepIdle, &1).map_err(network_exception)?;
        setsockopt(fd, TcpKeepCount, &3).map_err(network_exception)?;
        setsockopt(fd, TcpKeepInterval, &1).map_err(network_exception)?;

        let poll_read = Poll::new().map_err(network_exception)?;
        poll_read
            .registry()
            .register(&mut tcp_socket, CLIENT, Interest::READABLE)
            .map_err(network_exception)?;
        let header_size = bincode::serialized_size(&CommandHeader::new(CommandEnum::Connect, 0, 0))
            .map_err(network_exception)? as usize;
        Ok(Network {
            tcp_socket,
            timeout,
            command_id: 0,
            header_size,
            read_buffer: Vec::new(),
            received_responses: HashMap::new(),
            poll_read,
            events: Events::with_capacity(128),
        })
    }

    fn create_header(&mut self, command: CommandEnum, size: usize) -> CommandHeader {
        let header = CommandHeader::new(command, self.command_id, size as u32);
        self.command_id += 1;
        header
    }

    /// Sends a request preceded by its command header.
    /// # Return
    /// The command ID the response will carry.
    pub fn tcp_send_request<T: Serialize + Debug>(
        &mut self,
        command: CommandEnum,
        request: T,
    ) -> MpcResult<u32> {
        let mut message = RequestWithHeader {
            header: self.create_header(command, 0),
            request,
        };
        message.header.size = bincode::serialized_size(&message).map_err(network_exception)? as u32;
        debug!("sending {:?}", message);
        let encoded_request = bincode::serialize(&message).map_err(network_exception)?;
        self.tcp_socket
            .write_all(&encoded_request)
            .map_err(network_exception)?;
        Ok(message.get_command_message_id())
    }

    /// Blocks until a Response message with the given command ID has been received and returns this
    /// response.
    ///
    /// # Arguments
    /// * `command_id` - Expected command ID of the Response.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::MpcException::NetworkException`) if no response
    /// arrives within the timeout, the connection is lost or the response cannot be decoded.
    pub fn tcp_blocking_receive_response<T: DeserializeOwned + Debug>(
        &mut self,
        command_id: u32,
    ) -> MpcResult<T> {
        let response_bytes = self.wait_for_response_to_arrive(command_id)?;
        let response: T = bincode::deserialize(&response_bytes).map_err(network_exception)?;
        debug!("received {:?}", response);
        Ok(response)
    }

    fn wait_for_response_to_arrive(&mut self, command_id: u32) -> MpcResult<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(response) = self.received_responses.remove(&command_id) {
                return Ok(response);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(network_exception(format!(
                    "no response to command {} within {:?}",
                    command_id, self.timeout
                )));
            }
            self.tcp_read_from_buffer(deadline - now)?;
        }
    }

    fn tcp_read_from_buffer(&mut self, timeout: Duration) -> MpcResult<()> {
        self.poll_read
            .poll(&mut self.events, Some(timeout))
            .map_err(network_exception)?;
        let readable = self
            .events
            .iter()
            .any(|event| event.token() == CLIENT && event.is_readable());
        if !readable {
            return Ok(());
        }
        let mut chunk = [0_u8; 4096];
        loop {
            match self.tcp_socket.read(&mut chunk) {
                Ok(0) => return Err(network_exception("connection closed by server")),
                Ok(n) => self.read_buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(network_exception(e)),
            }
        }
        self.split_responses()
    }

    /// Moves every complete message of the read buffer to the received responses.
    fn split_responses(&mut self) -> MpcResult<()> {
        while self.read_buffer.len() >= self.header_size {
            let header: CommandHeader =
                bincode::deserialize(&self.read_buffer[..self.header_size])
                    .map_err(network_exception)?;
            let size = header.size as usize;
            if size < self.header_size {
                return Err(network_exception(format!(
                    "invalid message size {} in response to command {}",
                    size, header.command_id
                )));
            }
            if self.read_buffer.len() < size {
                break;
            }
            let rest = self.read_buffer.split_off(size);
            let message = std::mem::replace(&mut self.read_buffer, rest);
            self.received_responses.insert(header.command_id, message);
        }
        Ok(())
    }
}

fn wait_for_server(address: &SocketAddr, timeout: Duration) -> MpcResult<StdTcpStream> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining == Duration::from_secs(0) {
            return Err(network_exception(format!(
                "robot-control server at {} not available within {:?}",
                address, timeout
            )));
        }
        match StdTcpStream::connect_timeout(address, remaining) {
            Ok(socket) => return Ok(socket),
            Err(e) => {
                debug!("waiting for server at {}: {}", address, e);
                std::thread::sleep(CONNECT_RETRY_INTERVAL.min(remaining));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    use serde::{Deserialize, Serialize};

    use crate::exception::MpcException;
    use crate::network::Network;
    use crate::robot::service_types::{CommandEnum, CommandHeader, RequestWithHeader};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Echo {
        header: CommandHeader,
        value: u64,
    }

    #[test]
    fn split_responses_across_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let thread = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut bytes = vec![0_u8; 100];
            let request_size = bincode::serialized_size(&RequestWithHeader {
                header: CommandHeader::new(CommandEnum::Connect, 0, 0),
                request: 0_u64,
            })
            .unwrap() as usize;
            socket.read_exact(&mut bytes[..request_size]).unwrap();
            let request: RequestWithHeader<u64> = bincode::deserialize(&bytes).unwrap();
            let mut response = Echo {
                header: CommandHeader::new(CommandEnum::Connect, request.header.command_id, 0),
                value: request.request * 2,
            };
            response.header.size = bincode::serialized_size(&response).unwrap() as u32;
            let encoded = bincode::serialize(&response).unwrap();
            socket.write_all(&encoded[..5]).unwrap();
            socket.flush().unwrap();
            std::thread::sleep(Duration::from_millis(20));
            socket.write_all(&encoded[5..]).unwrap();
        });
        let mut network = Network::new("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let command_id = network.tcp_send_request(CommandEnum::Connect, 21_u64).unwrap();
        let response: Echo = network.tcp_blocking_receive_response(command_id).unwrap();
        assert_eq!(response.value, 42);
        assert_eq!(response.header.command_id, command_id);
        thread.join().unwrap();
    }

    #[test]
    fn unavailable_server_times_out() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let start = Instant::now();
        match Network::new("127.0.0.1", port, Duration::from_millis(300)) {
            Err(MpcException::NetworkException { .. }) => {}
            Err(e) => panic!("expected network error, found {:?}", e),
            Ok(_) => panic!("connected to a closed port"),
        }
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn missing_response_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let thread = std::thread::spawn(move || {
            let (_socket, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });
        let mut network = Network::new("127.0.0.1", port, Duration::from_millis(200)).unwrap();
        let command_id = network.tcp_send_request(CommandEnum::Connect, 1_u64).unwrap();
        match network.tcp_blocking_receive_response::<Echo>(command_id) {
            Err(MpcException::NetworkException { .. }) => {}
            other => panic!("expected network error, found {:?}", other),
        }
        thread.join().unwrap();
    }
}
