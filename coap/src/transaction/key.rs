use std::fmt;
use std::net::SocketAddr;

const MESSAGE_ID_TAG: u8 = b'm';
const TOKEN_TAG: u8 = b't';

/// Identity of a message-id or token as used by a given peer.
///
/// A BLAKE3 digest of the peer address, the peer port and the key. The
/// message-id and token spaces are tagged so that a token can never alias
/// a message-id.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub struct TransactionKey([u8; 32]);

impl TransactionKey {
    /// Key of the message-id `message_id` used by `peer`.
    pub fn from_message_id(message_id: u16, peer: &SocketAddr) -> Self {
        Self::digest(MESSAGE_ID_TAG, &message_id.to_be_bytes(), peer)
    }

    /// Key of the token `token` used by `peer`.
    pub fn from_token(token: &[u8], peer: &SocketAddr) -> Self {
        Self::digest(TOKEN_TAG, token, peer)
    }

    fn digest(tag: u8, key: &[u8], peer: &SocketAddr) -> Self {
        // IPv4-mapped addresses from dual-stack sockets hash as plain IPv4.
        let ip = peer.ip().to_canonical();
        let mut hasher = blake3::Hasher::new();

        hasher.update(ip.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(peer.port().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(&[tag]);
        hasher.update(key);

        Self(*hasher.finalize().as_bytes())
    }

    /// The raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionKey(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use super::*;

    fn peer(last: u8, port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 0, last)), port)
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = TransactionKey::from_message_id(0x74aa, &peer(1, 5683));
        let b = TransactionKey::from_message_id(0x74aa, &peer(1, 5683));
        assert_eq!(a, b);

        let a = TransactionKey::from_token(b"\x73\xaa", &peer(1, 5683));
        let b = TransactionKey::from_token(b"\x73\xaa", &peer(1, 5683));
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_id_from_different_peers_does_not_collide() {
        let a = TransactionKey::from_message_id(7, &peer(1, 5683));
        let b = TransactionKey::from_message_id(7, &peer(2, 5683));
        let c = TransactionKey::from_message_id(7, &peer(1, 5684));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_token_does_not_alias_message_id() {
        let id = TransactionKey::from_message_id(0x0102, &peer(1, 5683));
        let token = TransactionKey::from_token(&[0x01, 0x02], &peer(1, 5683));
        assert_ne!(id, token);
    }

    #[test]
    fn test_ipv4_mapped_peer_hashes_like_ipv4() {
        let mapped = SocketAddr::new(
            IpAddr::V6(Ipv4Addr::new(192, 168, 0, 1).to_ipv6_mapped()),
            5683,
        );
        assert_eq!(
            TransactionKey::from_message_id(9, &mapped),
            TransactionKey::from_message_id(9, &peer(1, 5683))
        );
        let v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 5683);
        assert_ne!(
            TransactionKey::from_message_id(9, &v6),
            TransactionKey::from_message_id(9, &peer(1, 5683))
        );
    }

    #[test]
    fn test_no_collisions_over_a_large_sample() {
        let mut seen = HashSet::new();
        for last in 0..8u8 {
            for port in [5683u16, 5684, 40000] {
                for id in 0..2048u16 {
                    assert!(seen.insert(TransactionKey::from_message_id(id, &peer(last, port))));
                }
                for token in 0..512u32 {
                    let token = token.to_be_bytes();
                    assert!(seen.insert(TransactionKey::from_token(&token, &peer(last, port))));
                }
            }
        }
    }
}
