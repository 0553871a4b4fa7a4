//! Publish-only MQTT 3.1.1 client over TCP, QoS 0
//!
//! The client is blocking and runs on the engine task. A reconnect can hold
//! the loop for up to `connect_timeout`; after a failed reconnect further
//! publishes fail fast with [`BrokerError::NotConnected`] until
//! `reconnect_backoff` has passed.

use crate::broker::error::{BrokerError, BrokerResult};
use crate::broker::packet::{encode_disconnect, encode_publish, parse_connack, ConnectPacket};
use crate::broker::Broker;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Connection parameters for [`MqttBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    /// Quiet period after a failed reconnect from `publish`
    pub reconnect_backoff: Duration,
    /// 0 disables keep-alive; publishes are sparse and each one reconnects
    /// on failure anyway
    pub keep_alive_secs: u16,
}

impl MqttOptions {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(5),
            reconnect_backoff: Duration::from_secs(5),
            keep_alive_secs: 0,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    fn connect_packet(&self) -> ConnectPacket<'_> {
        ConnectPacket {
            client_id: &self.client_id,
            username: self.username.as_deref(),
            password: self.password.as_deref(),
            keep_alive_secs: self.keep_alive_secs,
        }
    }
}

/// Blocking MQTT client; a lost connection is re-established on the next
/// publish
pub struct MqttBroker {
    options: MqttOptions,
    stream: Option<TcpStream>,
    retry_after: Option<Instant>,
}

impl MqttBroker {
    pub fn new(options: MqttOptions) -> Self {
        Self {
            options,
            stream: None,
            retry_after: None,
        }
    }

    pub fn options(&self) -> &MqttOptions {
        &self.options
    }

    fn open_stream(&self) -> BrokerResult<TcpStream> {
        let target = format!("{}:{}", self.options.host, self.options.port);
        let timeout = self.options.connect_timeout;

        let addrs = target
            .to_socket_addrs()
            .map_err(|e| BrokerError::ConnectionFailed(format!("{target}: {e}")))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) if e.kind() == std::io::ErrorKind::TimedOut => BrokerError::Timeout(timeout),
            Some(e) => BrokerError::ConnectionFailed(format!("{target}: {e}")),
            None => BrokerError::ConnectionFailed(format!("{target}: no addresses")),
        })
    }

    fn handshake(&self, stream: &mut TcpStream) -> BrokerResult<()> {
        let connect = self.options.connect_packet().encode()?;
        stream.write_all(&connect)?;

        let mut connack = [0u8; 4];
        stream.read_exact(&mut connack).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                BrokerError::Timeout(self.options.connect_timeout)
            }
            _ => BrokerError::IoError(e),
        })?;

        match parse_connack(&connack)? {
            0 => Ok(()),
            code => Err(BrokerError::ConnectionRefused(code)),
        }
    }
}

impl Broker for MqttBroker {
    fn connect(&mut self) -> BrokerResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut stream = self.open_stream()?;
        self.handshake(&mut stream)?;

        tracing::info!(
            target: "meshrelay::mqtt",
            "Connected to {}:{} as {}",
            self.options.host,
            self.options.port,
            self.options.client_id
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> BrokerResult<()> {
        let packet = encode_publish(topic, payload)?;

        if self.stream.is_none() {
            if self.retry_after.is_some_and(|at| Instant::now() < at) {
                return Err(BrokerError::NotConnected);
            }

            if let Err(e) = self.connect() {
                self.retry_after = Some(Instant::now() + self.options.reconnect_backoff);
                tracing::warn!(
                    target: "meshrelay::mqtt",
                    "Reconnect failed, next attempt in {:?}: {}",
                    self.options.reconnect_backoff,
                    e
                );
                return Err(e);
            }
            self.retry_after = None;
        }

        let stream = self.stream.as_mut().ok_or(BrokerError::NotConnected)?;
        if let Err(e) = stream.write_all(&packet).and_then(|_| stream.flush()) {
            self.stream = None;
            return Err(BrokerError::PublishFailed(e.to_string()));
        }

        tracing::trace!(target: "meshrelay::mqtt", "Published {} bytes to {}", payload.len(), topic);
        Ok(())
    }

    fn disconnect(&mut self) -> BrokerResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.write_all(&encode_disconnect())?;
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn read_packet(stream: &mut TcpStream) -> Vec<u8> {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).unwrap();
        // Test packets stay under 128 bytes
        let mut body = vec![0u8; header[1] as usize];
        stream.read_exact(&mut body).unwrap();
        [header.to_vec(), body].concat()
    }

    #[test]
    fn test_connect_publish_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let connect = read_packet(&mut stream);
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).unwrap();
            let publish = read_packet(&mut stream);
            let disconnect = read_packet(&mut stream);
            (connect, publish, disconnect)
        });

        let mut broker = MqttBroker::new(MqttOptions::new("127.0.0.1", port, "gateway"));
        broker.connect().unwrap();
        assert!(broker.is_connected());
        broker.publish("mesh/data/01", b"LDR=1").unwrap();
        broker.disconnect().unwrap();
        assert!(!broker.is_connected());

        let (connect, publish, disconnect) = server.join().unwrap();
        assert_eq!(connect[0], 0x10);
        assert!(connect.ends_with(b"gateway"));
        assert_eq!(publish[0], 0x30);
        assert!(publish.ends_with(b"mesh/data/01LDR=1"));
        assert_eq!(disconnect, vec![0xE0, 0x00]);
    }

    #[test]
    fn test_connection_refused_code() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_packet(&mut stream);
            // Not authorized
            stream.write_all(&[0x20, 0x02, 0x00, 0x05]).unwrap();
        });

        let mut broker = MqttBroker::new(MqttOptions::new("127.0.0.1", port, "gateway"));
        let result = broker.connect();
        assert!(matches!(result, Err(BrokerError::ConnectionRefused(5))));
        assert!(!broker.is_connected());

        server.join().unwrap();
    }

    #[test]
    fn test_unreachable_broker() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let options = MqttOptions::new("127.0.0.1", port, "gateway")
            .with_connect_timeout(Duration::from_millis(200));
        let mut broker = MqttBroker::new(options);
        assert!(broker.connect().is_err());
    }

    #[test]
    fn test_publish_backs_off_after_failed_reconnect() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let options = MqttOptions::new("127.0.0.1", port, "gateway")
            .with_connect_timeout(Duration::from_millis(200))
            .with_reconnect_backoff(Duration::from_secs(60));
        let mut broker = MqttBroker::new(options);

        let first = broker.publish("mesh/data/01", b"LDR=1");
        assert!(first.is_err());
        assert!(!matches!(first, Err(BrokerError::NotConnected)));

        let started = Instant::now();
        let second = broker.publish("mesh/data/01", b"LDR=2");
        assert!(matches!(second, Err(BrokerError::NotConnected)));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_credentials_ignore_empty_strings() {
        let options = MqttOptions::new("h", 1, "c")
            .with_credentials(Some(String::new()), Some("pw".into()));
        assert_eq!(options.username, None);
        assert_eq!(options.password.as_deref(), Some("pw"));
    }
}
