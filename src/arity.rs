// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! Bounded compile-time substitute for runtime argument-count introspection.
//!
//! Rust has no runtime signature introspection, so truncating a slot to a
//! prefix of the emitted arguments is instead realized as a family of
//! `connect_takeN` methods, one per prefix length, implemented here via
//! `TruncateN` traits over the emitted tuple. The signal's maximum arity is
//! fixed at 4 (see `DESIGN.md`), so these
//! traits only need to be implemented for tuples of length 2 through 4 —
//! shorter tuples have no proper prefix to truncate to.

/// Implemented by any argument tuple with a 1-element prefix.
pub trait Truncate1 {
    /// Type of the first emitted argument.
    type A0;
    /// Drops every argument but the first.
    fn take1(self) -> (Self::A0,);
}

/// Implemented by any argument tuple with a 2-element prefix.
pub trait Truncate2 {
    /// Type of the first emitted argument.
    type A0;
    /// Type of the second emitted argument.
    type A1;
    /// Drops every argument but the first two.
    fn take2(self) -> (Self::A0, Self::A1);
}

/// Implemented by any argument tuple with a 3-element prefix.
pub trait Truncate3 {
    /// Type of the first emitted argument.
    type A0;
    /// Type of the second emitted argument.
    type A1;
    /// Type of the third emitted argument.
    type A2;
    /// Drops every argument but the first three.
    fn take3(self) -> (Self::A0, Self::A1, Self::A2);
}

impl<A0, A1> Truncate1 for (A0, A1) {
    type A0 = A0;
    fn take1(self) -> (A0,) {
        (self.0,)
    }
}

impl<A0, A1, A2> Truncate1 for (A0, A1, A2) {
    type A0 = A0;
    fn take1(self) -> (A0,) {
        (self.0,)
    }
}

impl<A0, A1, A2> Truncate2 for (A0, A1, A2) {
    type A0 = A0;
    type A1 = A1;
    fn take2(self) -> (A0, A1) {
        (self.0, self.1)
    }
}

impl<A0, A1, A2, A3> Truncate1 for (A0, A1, A2, A3) {
    type A0 = A0;
    fn take1(self) -> (A0,) {
        (self.0,)
    }
}

impl<A0, A1, A2, A3> Truncate2 for (A0, A1, A2, A3) {
    type A0 = A0;
    type A1 = A1;
    fn take2(self) -> (A0, A1) {
        (self.0, self.1)
    }
}

impl<A0, A1, A2, A3> Truncate3 for (A0, A1, A2, A3) {
    type A0 = A0;
    type A1 = A1;
    type A2 = A2;
    fn take3(self) -> (A0, A1, A2) {
        (self.0, self.1, self.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take1_drops_everything_but_the_first() {
        assert_eq!((1, "a").take1(), (1,));
        assert_eq!((1, "a", 2.0).take1(), (1,));
        assert_eq!((1, "a", 2.0, true).take1(), (1,));
    }

    #[test]
    fn take2_drops_everything_but_the_first_two() {
        assert_eq!((1, "a", 2.0).take2(), (1, "a"));
        assert_eq!((1, "a", 2.0, true).take2(), (1, "a"));
    }

    #[test]
    fn take3_drops_the_fourth() {
        assert_eq!((1, "a", 2.0, true).take3(), (1, "a", 2.0));
    }
}
