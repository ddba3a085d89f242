//! Modular identifier space.
//!
//! Positions live on a ring of `2^bits` slots. Everything here is modular: there is
//! deliberately no [Ord] on [RingPosition], use the interval predicates of [Ring].

use std::fmt::{self, Display, Formatter};

use crate::common::{Id, ID_SIZE};
use crate::{Error, Result};

/// Widest supported ring, and the number of wedges per side minus one.
pub const NBIT: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// A position on the ring.
pub struct RingPosition(pub u32);

impl Display for RingPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// Ring of `2^bits` positions.
pub struct Ring {
    bits: u8,
}

impl Default for Ring {
    fn default() -> Self {
        Ring { bits: NBIT as u8 }
    }
}

impl Ring {
    /// Create a ring of `2^bits` positions, `bits` must be within `1..=32`.
    pub fn new(bits: u8) -> Result<Self> {
        if bits == 0 || bits as usize > NBIT {
            return Err(Error::InvalidRingWidth(bits));
        }

        Ok(Ring { bits })
    }

    // === Getters ===

    pub fn bits(&self) -> usize {
        self.bits as usize
    }

    /// Number of positions on this ring.
    pub fn size(&self) -> u64 {
        1 << self.bits
    }

    // === Identities ===

    /// Reduce an identity onto this ring: the leading `bits` bits of its [Id::ring_key].
    pub fn position(&self, id: &Id) -> RingPosition {
        RingPosition((id.ring_key() as u64 >> (NBIT - self.bits())) as u32)
    }

    /// An identity that reduces to `position` on this ring.
    ///
    /// Useful to place nodes at fixed positions in tests and simulations.
    pub fn id_at(&self, position: RingPosition) -> Id {
        let key = (self.wrap(position.0 as u64) << (NBIT - self.bits())) as u32;

        let mut bytes = [0; ID_SIZE];
        bytes[..4].copy_from_slice(&key.to_be_bytes());

        Id(bytes)
    }

    // === Arithmetic ===

    /// `position + delta`
    pub fn add(&self, position: RingPosition, delta: u64) -> RingPosition {
        RingPosition(self.wrap(position.0 as u64 + self.wrap(delta)) as u32)
    }

    /// `position - delta`
    pub fn sub(&self, position: RingPosition, delta: u64) -> RingPosition {
        RingPosition(self.wrap(position.0 as u64 + self.size() - self.wrap(delta)) as u32)
    }

    /// Clockwise distance walking from `from` to `to`.
    pub fn distance(&self, from: RingPosition, to: RingPosition) -> u64 {
        self.wrap(to.0 as u64 + self.size() - self.wrap(from.0 as u64))
    }

    // === Intervals ===

    /// `x` in the open interval `(a, b)`.
    ///
    /// When `a == b` the interval is the whole ring except `a`.
    pub fn between(&self, a: RingPosition, x: RingPosition, b: RingPosition) -> bool {
        let dx = self.distance(a, x);

        if a == b {
            return dx != 0;
        }

        dx != 0 && dx < self.distance(a, b)
    }

    /// `x` in `(a, b]`, the whole ring when `a == b`.
    pub fn between_right_incl(&self, a: RingPosition, x: RingPosition, b: RingPosition) -> bool {
        a == b || x == b || self.between(a, x, b)
    }

    /// `x` in `[a, b)`, the whole ring when `a == b`.
    pub fn between_left_incl(&self, a: RingPosition, x: RingPosition, b: RingPosition) -> bool {
        a == b || x == a || self.between(a, x, b)
    }

    /// Is `a` reached before `b` walking clockwise from `target`.
    pub fn closer_succeeding(&self, target: RingPosition, a: RingPosition, b: RingPosition) -> bool {
        self.distance(target, a) < self.distance(target, b)
    }

    /// Is `a` reached before `b` walking counter-clockwise from `target`.
    pub fn closer_preceding(&self, target: RingPosition, a: RingPosition, b: RingPosition) -> bool {
        self.distance(a, target) < self.distance(b, target)
    }

    fn wrap(&self, value: u64) -> u64 {
        value & (self.size() - 1)
    }
}

/// Number of significant bits in `distance`, 0 for 0.
pub fn bit_length(distance: u64) -> usize {
    (u64::BITS - distance.leading_zeros()) as usize
}
