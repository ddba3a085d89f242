//! Node identity, richer than the ring position it reduces to.
use rand::Rng;
use std::fmt::{self, Debug, Display, Formatter};
use std::net::SocketAddr;

use crate::{Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// 160 bit node identity.
///
/// Only the leading 32 bits take part in routing, see [Id::ring_key] and
/// [crate::Ring::position].
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// Default identity of a node listening on `address`: the sha1 of `ip:port`.
    pub fn from_address(address: SocketAddr) -> Id {
        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(address.to_string().as_bytes());

        Id(hasher.digest().bytes())
    }

    /// The full-width (32 bits) reduction of this identity onto the ring,
    /// the big-endian value of its first four bytes.
    pub fn ring_key(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_bytes_checks_size() {
        assert!(Id::from_bytes([0u8; 19]).is_err());
        assert!(Id::from_bytes([7u8; ID_SIZE]).is_ok());
    }

    #[test]
    fn address_identity_is_deterministic() {
        let address: SocketAddr = "127.0.0.1:6881".parse().unwrap();

        assert_eq!(Id::from_address(address), Id::from_address(address));
        assert_ne!(
            Id::from_address(address),
            Id::from_address("127.0.0.1:6882".parse().unwrap())
        );
    }

    #[test]
    fn ring_key_reads_leading_bytes() {
        let mut bytes = [0u8; ID_SIZE];
        bytes[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        assert_eq!(Id(bytes).ring_key(), 0xdeadbeef);
    }
}
