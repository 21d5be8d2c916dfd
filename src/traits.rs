//! Seams between the engine and its collaborators.
//!
//! The trellis never looks at raw sequence text: it consumes a
//! [`DigitizedSequence`] whose symbols are already alphabet indices. Decoded
//! paths leave through a [`PathReceiver`], which sees states in the order the
//! traceback produces them (last position first).

/// A read-only sequence of alphabet indices.
///
/// Only the length and indexed lookup are used. Implementations must return
/// a symbol for every `position < len()`.
pub trait DigitizedSequence {
    /// Number of symbols.
    fn len(&self) -> usize;

    /// Alphabet index at `position`.
    fn symbol(&self, position: usize) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DigitizedSequence for [usize] {
    #[inline]
    fn len(&self) -> usize {
        <[usize]>::len(self)
    }

    #[inline]
    fn symbol(&self, position: usize) -> usize {
        self[position]
    }
}

impl DigitizedSequence for Vec<usize> {
    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }

    #[inline]
    fn symbol(&self, position: usize) -> usize {
        self[position]
    }
}

impl DigitizedSequence for [u8] {
    #[inline]
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    #[inline]
    fn symbol(&self, position: usize) -> usize {
        usize::from(self[position])
    }
}

/// Sink for decoded state indices.
///
/// Tracebacks walk from the final position to the first, so `push_state` is
/// called back-to-front. `finish` is called once after the last push.
pub trait PathReceiver {
    fn push_state(&mut self, state: usize);

    fn finish(&mut self) {}
}

impl PathReceiver for Vec<usize> {
    fn push_state(&mut self, state: usize) {
        self.push(state);
    }
}
