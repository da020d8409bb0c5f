//! Kademlia node Id or a lookup target
use rand::Rng;
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::Error;

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The size of node IDs in bits.
pub const MAX_DISTANCE: u8 = ID_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
/// Kademlia node Id or a lookup target
pub struct Id([u8; ID_SIZE]);

impl Id {
    /// Generate a random Id.
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id, Error> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp.copy_from_slice(bytes);

        Ok(Id(tmp))
    }

    /// XOR distance between this Id and a target Id.
    ///
    /// Distance to self is zero, and the distance is symmetric.
    pub fn distance(&self, other: &Id) -> Distance {
        let mut xor = [0_u8; ID_SIZE];

        for (i, byte) in xor.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Distance(xor)
    }

    /// Number of leading bits this Id shares with `other`.
    pub fn common_prefix_len(&self, other: &Id) -> u8 {
        self.distance(other).leading_zeros()
    }

    /// Returns the bit at `index`, counting from the most significant bit.
    pub fn bit(&self, index: usize) -> bool {
        let byte = self.0[index / 8];
        (byte >> (7 - (index % 8))) & 1 == 1
    }

    /// Returns a random Id that shares exactly `prefix_len` leading bits with this one,
    /// or at least `prefix_len` bits if `flip` is false.
    pub(crate) fn random_with_prefix(&self, prefix_len: u8, flip: bool) -> Id {
        let mut random = Id::random().0;
        let prefix_len = (prefix_len as usize).min(ID_SIZE * 8);

        for index in 0..prefix_len {
            set_bit(&mut random, index, self.bit(index));
        }

        if flip && prefix_len < ID_SIZE * 8 {
            set_bit(&mut random, prefix_len, !self.bit(prefix_len));
        }

        Id(random)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

fn set_bit(bytes: &mut [u8; ID_SIZE], index: usize, value: bool) {
    let mask = 1 << (7 - (index % 8));

    if value {
        bytes[index / 8] |= mask;
    } else {
        bytes[index / 8] &= !mask;
    }
}

/// XOR distance between two ids, `distance(a, b)`.
pub fn distance(a: &Id, b: &Id) -> Distance {
    a.distance(b)
}

/// Returns `true` if `a` is strictly closer to `reference` than `b`.
pub fn closer(a: &Id, b: &Id, reference: &Id) -> bool {
    a.distance(reference) < b.distance(reference)
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
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

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id, Error> {
        if s.len() != ID_SIZE * 2 {
            return Err(Error::InvalidIdEncoding);
        }

        let mut bytes = [0_u8; ID_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = s.get(i * 2..i * 2 + 2).ok_or(Error::InvalidIdEncoding)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| Error::InvalidIdEncoding)?;
        }

        Ok(Id(bytes))
    }
}

/// XOR of two [Id]s, ordered as an unsigned big-endian integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; ID_SIZE]);

impl Distance {
    pub fn is_zero(&self) -> bool {
        self.0 == [0; ID_SIZE]
    }

    /// Count of leading zero bits, which is the common prefix length of the two ids.
    pub fn leading_zeros(&self) -> u8 {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return (i as u32 * 8 + byte.leading_zeros()) as u8;
            }
        }

        MAX_DISTANCE
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }
}

impl Debug for Distance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", Id(self.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn distance_to_self() {
        let id = Id::random();

        assert!(id.distance(&id).is_zero());
        assert_eq!(id.distance(&id).leading_zeros(), MAX_DISTANCE);
    }

    #[test]
    fn distance_is_symmetric() {
        for _ in 0..32 {
            let a = Id::random();
            let b = Id::random();

            assert_eq!(distance(&a, &b), distance(&b, &a));
        }
    }

    #[test]
    fn distance_ordering() {
        let target = Id::from_str("0000000000000000000000000000000000000000").unwrap();
        let near = Id::from_str("0000000000000000000000000000000000000001").unwrap();
        let far = Id::from_str("8000000000000000000000000000000000000000").unwrap();

        assert!(closer(&near, &far, &target));
        assert!(!closer(&far, &near, &target));
        assert!(!closer(&near, &near, &target));
        assert_eq!(target.distance(&far).leading_zeros(), 0);
        assert_eq!(target.distance(&near).leading_zeros(), 159);
    }

    #[test]
    fn hex_round_trip() {
        let id = Id::random();
        let parsed = Id::from_str(&id.to_string()).unwrap();

        assert_eq!(parsed, id);
        assert!(Id::from_str("zz").is_err());
        assert!(Id::from_str(&"g".repeat(40)).is_err());
    }

    #[test]
    fn from_bytes_rejects_wrong_size() {
        assert_eq!(Id::from_bytes([0; 19]), Err(Error::InvalidIdSize(19)));
        assert!(Id::from_bytes([0; 20]).is_ok());
    }

    #[test]
    fn random_with_prefix() {
        let id = Id::random();

        for prefix in [0_u8, 1, 7, 8, 42, 159] {
            let exact = id.random_with_prefix(prefix, true);
            assert_eq!(id.common_prefix_len(&exact), prefix);

            let at_least = id.random_with_prefix(prefix, false);
            assert!(id.common_prefix_len(&at_least) >= prefix);
        }
    }
}
