//! Bus client — framing, byte-order conversion, and connection lifecycle for
//! the register-frame protocol over a single TCP connection.
//!
//! Ported from the original client's `client_lcloud_bus_request`: one
//! synchronous request/response per call, no pipelining, no timeouts. On any
//! transport or crypto failure the connection is deliberately left alone —
//! the caller is expected to observe the error and eventually call
//! [`crate::filesystem::Session::shutdown`].

use std::io::{Read, Write};
use std::net::TcpStream;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, error};

use crate::config::ClientConfig;
use crate::crypto::CipherState;
use crate::device::BLOCK_SIZE;
use crate::error::LcError;
use crate::register::{self, BLOCK_XFER, POWER_OFF, XFER_READ, XFER_WRITE};

/// Owns the single TCP connection to the device server and, when
/// encryption is configured, the session's cipher state.
pub struct BusClient {
    ip: String,
    port: u16,
    socket: Option<TcpStream>,
    encrypted: bool,
    cipher: Option<CipherState>,
}

impl BusClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            ip: config.ip.clone(),
            port: config.port,
            socket: None,
            encrypted: config.encrypted,
            cipher: None,
        }
    }

    fn ensure_connected(&mut self) -> Result<(), LcError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect((self.ip.as_str(), self.port))
            .map_err(|e| LcError::Transport(format!("connect to {}:{} failed: {e}", self.ip, self.port)))?;
        self.socket = Some(stream);
        if self.encrypted {
            self.cipher = Some(CipherState::new_random());
            debug!("bus: encryption enabled, fresh session key/IV generated");
        }
        Ok(())
    }

    /// Issue one request/response round trip.
    ///
    /// `buf` is both the source of WRITE payloads and the destination of
    /// READ payloads; it must be exactly `BLOCK_SIZE` bytes for BLOCK_XFER
    /// requests (callers in [`crate::device`] guarantee this).
    pub fn bus_request(&mut self, frame: u64, buf: &mut [u8]) -> Result<u64, LcError> {
        self.ensure_connected()?;
        let fields = register::unpack(frame);

        let socket = self.socket.as_mut().expect("ensure_connected just set this");

        write_frame(socket, frame)?;

        match (fields.c0, fields.c2) {
            (BLOCK_XFER, XFER_READ) => {
                let resp = read_frame(socket)?;
                let mut staging = vec![0u8; BLOCK_SIZE];
                socket
                    .read_exact(&mut staging)
                    .map_err(|e| LcError::Transport(format!("short read on BLOCK_XFER payload: {e}")))?;
                if let Some(cipher) = &self.cipher {
                    let plain = cipher
                        .decrypt(&staging)
                        .map_err(|e| LcError::Crypto(e.to_string()))?;
                    buf.copy_from_slice(&plain);
                } else {
                    buf.copy_from_slice(&staging);
                }
                Ok(resp)
            }
            (BLOCK_XFER, XFER_WRITE) => {
                if let Some(cipher) = &self.cipher {
                    let cipher_payload = cipher.encrypt(buf).map_err(|e| LcError::Crypto(e.to_string()))?;
                    socket
                        .write_all(&cipher_payload)
                        .map_err(|e| LcError::Transport(format!("short write on BLOCK_XFER payload: {e}")))?;
                } else {
                    socket
                        .write_all(buf)
                        .map_err(|e| LcError::Transport(format!("short write on BLOCK_XFER payload: {e}")))?;
                }
                read_frame(socket)
            }
            (POWER_OFF, _) => {
                let resp = read_frame(socket)?;
                // The server has closed its side; release ours and any key
                // material. Left to the caller's next ensure_connected().
                self.socket = None;
                self.cipher = None;
                Ok(resp)
            }
            _ => read_frame(socket),
        }
        .map_err(|e| {
            error!("bus: request (opcode {}) failed: {e}", fields.c0);
            e
        })
    }
}

fn write_frame(socket: &mut TcpStream, frame: u64) -> Result<(), LcError> {
    socket
        .write_u64::<BigEndian>(frame)
        .map_err(|e| LcError::Transport(format!("short write on register frame: {e}")))
}

fn read_frame(socket: &mut TcpStream) -> Result<u64, LcError> {
    socket
        .read_u64::<BigEndian>()
        .map_err(|e| LcError::Transport(format!("short read on register frame: {e}")))
}
