//! TLS-secured socket channel.
//!
//! Forward-only: seeking fails. The record layer is rustls's own; reads
//! drain decrypted plaintext and pull a new record only when exhausted,
//! writes accumulate into the connection's send buffer and are pushed out
//! on flush or when a record fills.

use super::{Channel, SeekFrom};
use crate::{Error, Result};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Once};

use tracing::debug;

static CRYPTO_INIT: Once = Once::new();

/// Install the process-wide rustls crypto provider.
///
/// Idempotent; guarded by a [`Once`]. Called automatically by
/// [`TlsChannel::connect`], but exposed so hosts that build their own rustls
/// configs can share the same initialization point.
pub fn ensure_crypto_initialized() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Channel over a TLS client connection.
pub struct TlsChannel {
    stream: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    server_name: String,
    pos: u64,
}

impl TlsChannel {
    /// Connect to `addr`, validating the certificate against `server_name`
    /// using the webpki root store.
    ///
    /// The handshake is driven to completion here; on failure (including
    /// certificate validation) no channel is returned.
    pub fn connect<A: ToSocketAddrs>(addr: A, server_name: &str) -> Result<Self> {
        ensure_crypto_initialized();

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let name = rustls::pki_types::ServerName::try_from(server_name.to_string())
            .map_err(|e| Error::Tls(format!("invalid server name {server_name:?}: {e}")))?;

        let mut conn = rustls::ClientConnection::new(Arc::new(config), name)
            .map_err(|e| Error::Tls(format!("connection setup: {e}")))?;

        let mut tcp = TcpStream::connect(addr)?;

        while conn.is_handshaking() {
            conn.complete_io(&mut tcp).map_err(handshake_error)?;
        }
        debug!(server = server_name, "TLS handshake complete");

        Ok(Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            server_name: server_name.to_string(),
            pos: 0,
        })
    }

    /// Server name the certificate was validated against. Diagnostic only.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Map a handshake I/O error, surfacing certificate validation status.
fn handshake_error(err: std::io::Error) -> Error {
    if let Some(tls) = err.get_ref().and_then(|e| e.downcast_ref::<rustls::Error>()) {
        if let rustls::Error::InvalidCertificate(cert_err) = tls {
            return Error::Tls(format!("certificate validation failed: {cert_err:?}"));
        }
        return Error::Tls(format!("handshake failed: {tls}"));
    }
    Error::Tls(format!("handshake failed: {err}"))
}

impl Channel for TlsChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(n) => {
                self.pos += n as u64;
                Ok(n)
            }
            // Peer closed without close_notify; treat as clean EOF.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.stream.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(Error::NotSeekable)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<()> {
        self.stream.conn.send_close_notify();
        self.stream.flush()?;
        Ok(())
    }
}
