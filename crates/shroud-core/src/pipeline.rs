//! Secure message pipeline.
//!
//! Shared by both roles. Owns the local key pair and the send buffer; the
//! caller owns the handshake state and passes the resolved peer key in. Every
//! outbound payload is sealed with a fresh random nonce and encoded as
//! `Data{ciphertext, nonce}`; every inbound `Data` is opened with the key the
//! handshake stored for its connection.

use bytes::Bytes;
use shroud_crypto::{KeyPair, NONCE_SIZE, Nonce, PublicKey};
use shroud_proto::{Message, SendBuffer};

use crate::{config::ChannelConfig, env::Environment, error::ChannelError};

/// Direction of a payload, for size logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sealed and sent
    Outbound,
    /// Received and opened
    Inbound,
}

/// Key pair, send buffer and configuration of one endpoint.
///
/// # Invariants
///
/// - The send buffer is allocated once with `max_packet_size` bytes and never
///   resized.
/// - Nothing is sealed or opened without a resolved peer key.
pub struct SecureChannel {
    key_pair: KeyPair,
    send_buffer: SendBuffer,
    config: ChannelConfig,
}

impl SecureChannel {
    /// Create a channel around an existing key pair.
    #[must_use]
    pub fn new(key_pair: KeyPair, config: ChannelConfig) -> Self {
        Self { key_pair, send_buffer: SendBuffer::new(config.max_packet_size), config }
    }

    /// Create a channel with a fresh key pair drawn from `env`.
    #[must_use]
    pub fn generate<E: Environment>(env: &E, config: ChannelConfig) -> Self {
        Self::new(KeyPair::from_private_bytes(env.random_array()), config)
    }

    /// Local public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.key_pair.public_key()
    }

    /// Channel configuration.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Transport's maximum packet size (send buffer capacity).
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.send_buffer.capacity()
    }

    /// Encode `ServerPublicKey{own key}`.
    pub fn server_hello(&mut self) -> Result<Bytes, ChannelError> {
        let public_key = self.public_key().as_bytes().to_vec();
        Ok(self.send_buffer.encode(&Message::ServerPublicKey { public_key })?)
    }

    /// Encode `ClientPublicKey{own key}`.
    pub fn client_hello(&mut self) -> Result<Bytes, ChannelError> {
        let public_key = self.public_key().as_bytes().to_vec();
        Ok(self.send_buffer.encode(&Message::ClientPublicKey { public_key })?)
    }

    /// Decode an inbound frame, capping every field at `max_packet_size`.
    pub fn decode(&self, frame: &[u8]) -> Result<Message, ChannelError> {
        Ok(Message::decode(frame, self.config.max_packet_size)?)
    }

    /// Parse a public key carried by a handshake message.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Crypto` for a key of the wrong length, or a low-order
    ///   key that no box could ever be sealed or opened with
    pub fn parse_peer_key(&self, bytes: &[u8]) -> Result<PublicKey, ChannelError> {
        let key = PublicKey::from_slice(bytes)?;
        self.key_pair.check_peer(&key)?;
        Ok(key)
    }

    /// Seal `plaintext` for `peer` and encode it as a `Data` frame.
    ///
    /// # Errors
    ///
    /// - `ChannelError::UnresolvedSession` if `peer` is `None`; nothing is
    ///   encrypted
    /// - `ChannelError::Crypto` for a weak peer key
    /// - `ChannelError::Protocol` (`BufferOverflow`) if the frame exceeds the
    ///   send buffer
    pub fn seal<E: Environment>(
        &mut self,
        env: &E,
        peer: Option<&PublicKey>,
        plaintext: &[u8],
    ) -> Result<Bytes, ChannelError> {
        let peer = peer.ok_or(ChannelError::UnresolvedSession)?;

        let nonce = Nonce::from_bytes(env.random_array::<NONCE_SIZE>());
        let ciphertext = shroud_crypto::encrypt(plaintext, &nonce, &self.key_pair, peer)?;

        let message = Message::Data { ciphertext, nonce: nonce.as_bytes().to_vec() };
        Ok(self.send_buffer.encode(&message)?)
    }

    /// Open a `Data` payload sent by `peer`.
    ///
    /// # Errors
    ///
    /// - `ChannelError::UnresolvedSession` if `peer` is `None`
    /// - `ChannelError::Crypto` for a nonce of the wrong length
    /// - `ChannelError::Decryption` if authentication fails
    pub fn open(
        &self,
        peer: Option<&PublicKey>,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Vec<u8>, ChannelError> {
        let peer = peer.ok_or(ChannelError::UnresolvedSession)?;
        let nonce = Nonce::from_slice(nonce)?;
        Ok(shroud_crypto::decrypt(ciphertext, &nonce, &self.key_pair, peer)?)
    }

    /// Size report for a payload when `log_payloads` is on.
    #[must_use]
    pub fn payload_log(&self, direction: Direction, plain: usize, frame: usize) -> Option<String> {
        if !self.config.log_payloads {
            return None;
        }

        let delta = frame.saturating_sub(plain);
        Some(match direction {
            Direction::Outbound => {
                format!("sealed {plain} byte payload into {frame} byte frame (+{delta})")
            },
            Direction::Inbound => {
                format!("opened {frame} byte frame into {plain} byte payload (-{delta})")
            },
        })
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("public_key", &self.key_pair.public_key())
            .field("max_packet_size", &self.send_buffer.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU8, Ordering},
        },
        time::{Duration, Instant},
    };

    use shroud_crypto::CryptoError;
    use shroud_proto::ProtocolError;

    use super::*;

    /// Deterministic environment: each call fills with an incrementing byte.
    #[derive(Clone, Default)]
    struct TestEnv {
        counter: Arc<AtomicU8>,
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let value = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            buffer.fill(value);
        }
    }

    fn pair(env: &TestEnv) -> (SecureChannel, SecureChannel) {
        let server = SecureChannel::generate(env, ChannelConfig::default());
        let client = SecureChannel::generate(env, ChannelConfig::default());
        (server, client)
    }

    fn open_frame(channel: &SecureChannel, peer: &PublicKey, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        match channel.decode(frame)? {
            Message::Data { ciphertext, nonce } => channel.open(Some(peer), &ciphertext, &nonce),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn seal_open_between_roles() {
        let env = TestEnv::default();
        let (mut server, client) = pair(&env);

        let frame = server.seal(&env, Some(&client.public_key()), b"ping").unwrap();
        let plaintext = open_frame(&client, &server.public_key(), &frame).unwrap();

        assert_eq!(plaintext, b"ping");
    }

    #[test]
    fn seal_without_peer_is_unresolved() {
        let env = TestEnv::default();
        let (mut server, _) = pair(&env);

        assert_eq!(server.seal(&env, None, b"ping"), Err(ChannelError::UnresolvedSession));
    }

    #[test]
    fn open_without_peer_is_unresolved() {
        let env = TestEnv::default();
        let (server, _) = pair(&env);

        assert_eq!(server.open(None, &[0; 20], &[0; 24]), Err(ChannelError::UnresolvedSession));
    }

    #[test]
    fn each_seal_uses_fresh_nonce() {
        let env = TestEnv::default();
        let (mut server, client) = pair(&env);

        let a = server.seal(&env, Some(&client.public_key()), b"same").unwrap();
        let b = server.seal(&env, Some(&client.public_key()), b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_frame_fails_decryption() {
        let env = TestEnv::default();
        let (mut server, client) = pair(&env);

        let frame = server.seal(&env, Some(&client.public_key()), b"ping").unwrap();
        let mut tampered = frame.to_vec();
        // Opcode (1) + length prefix (4), then ciphertext
        tampered[5] ^= 0x01;

        assert_eq!(open_frame(&client, &server.public_key(), &tampered), Err(ChannelError::Decryption));
    }

    #[test]
    fn wrong_sender_key_fails_decryption() {
        let env = TestEnv::default();
        let (mut server, client) = pair(&env);
        let other = SecureChannel::generate(&env, ChannelConfig::default());

        let frame = server.seal(&env, Some(&client.public_key()), b"ping").unwrap();
        assert_eq!(open_frame(&client, &other.public_key(), &frame), Err(ChannelError::Decryption));
    }

    #[test]
    fn short_nonce_is_crypto_error() {
        let env = TestEnv::default();
        let (server, client) = pair(&env);

        let result = client.open(Some(&server.public_key()), &[0; 20], &[0; 8]);
        assert!(matches!(result, Err(ChannelError::Crypto(_))));
    }

    #[test]
    fn oversized_payload_overflows_send_buffer() {
        let env = TestEnv::default();
        let config = ChannelConfig { max_packet_size: 64, ..ChannelConfig::default() };
        let mut server = SecureChannel::generate(&env, config);
        let client = SecureChannel::generate(&env, ChannelConfig::default());

        let result = server.seal(&env, Some(&client.public_key()), &[0u8; 64]);
        assert!(matches!(result, Err(ChannelError::Protocol(ProtocolError::BufferOverflow { .. }))));
    }

    #[test]
    fn hello_frames_carry_public_key() {
        let env = TestEnv::default();
        let (mut server, mut client) = pair(&env);

        let frame = server.server_hello().unwrap();
        insta::assert_snapshot!(hex::encode(&frame[..5]), @"0020000000");
        assert_eq!(
            server.decode(&frame).unwrap(),
            Message::ServerPublicKey { public_key: server.public_key().as_bytes().to_vec() }
        );

        let frame = client.client_hello().unwrap();
        insta::assert_snapshot!(hex::encode(&frame[..5]), @"0120000000");
    }

    #[test]
    fn peer_key_must_be_usable() {
        let env = TestEnv::default();
        let (server, client) = pair(&env);

        assert_eq!(server.parse_peer_key(client.public_key().as_bytes()), Ok(client.public_key()));
        assert_eq!(server.parse_peer_key(&[0; 32]), Err(ChannelError::Crypto(CryptoError::WeakPublicKey)));
        assert!(matches!(
            server.parse_peer_key(&[1; 16]),
            Err(ChannelError::Crypto(CryptoError::InvalidKeyLength { .. }))
        ));
    }

    #[test]
    fn payload_log_respects_config() {
        let env = TestEnv::default();
        let (server, _) = pair(&env);
        assert!(server.payload_log(Direction::Outbound, 4, 57).is_none());

        let logging = SecureChannel::generate(&env, ChannelConfig { log_payloads: true, ..ChannelConfig::default() });
        assert_eq!(
            logging.payload_log(Direction::Outbound, 4, 57).as_deref(),
            Some("sealed 4 byte payload into 57 byte frame (+53)")
        );
    }
}
