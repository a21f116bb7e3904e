use core::fmt;

use serde::{Deserialize, Serialize};

use crate::config::LOG_LINE_CAPACITY;

/// Append-only circular text buffer.
///
/// Once the head has wrapped the oldest bytes are overwritten and the start
/// of the surviving history is generally mid-line; [`replay`](Self::replay)
/// skips forward to the first complete line.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DiagnosticRing<const N: usize> {
    #[serde(with = "ring_bytes")]
    buffer: [u8; N],
    head: u32,
    wrapped: bool,
}

/// The surviving history in write order: `older` then `newer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replay<'a> {
    pub older: &'a [u8],
    pub newer: &'a [u8],
}

impl<const N: usize> DiagnosticRing<N> {
    pub const fn new() -> Self {
        Self {
            buffer: [0; N],
            head: 0,
            wrapped: false,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn head(&self) -> usize {
        self.head as usize
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Bytes of history currently held
    pub fn len(&self) -> usize {
        if self.wrapped { N } else { self.head() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Head within bounds; anything else means the region holds garbage.
    pub fn is_consistent(&self) -> bool {
        N == 0 || self.head() < N
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.wrapped = false;
    }

    /// Write `bytes` at the head, wrapping at capacity.
    ///
    /// Input longer than the ring keeps only its last `N` bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        if N == 0 {
            return;
        }

        let mut rest = if bytes.len() > N {
            &bytes[bytes.len() - N..]
        } else {
            bytes
        };

        while !rest.is_empty() {
            let head = self.head();
            let count = (N - head).min(rest.len());
            self.buffer[head..head + count].copy_from_slice(&rest[..count]);
            rest = &rest[count..];

            let next = head + count;
            if next == N {
                self.head = 0;
                self.wrapped = true;
            } else {
                self.head = next as u32;
            }
        }
    }

    /// Linearize the history so that it starts on a line boundary.
    pub fn replay(&self) -> Replay<'_> {
        let head = self.head();
        if !self.wrapped {
            return Replay {
                older: &[],
                newer: &self.buffer[..head],
            };
        }

        let tail = &self.buffer[head..];
        match tail.iter().position(|&b| b == b'\n') {
            Some(newline) => Replay {
                older: &tail[newline + 1..],
                newer: &self.buffer[..head],
            },
            None => {
                // The oldest partial line runs on into the front of the buffer
                let front = &self.buffer[..head];
                let start = front
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(head, |newline| newline + 1);
                Replay {
                    older: &[],
                    newer: &front[start..],
                }
            }
        }
    }
}

impl<const N: usize> Default for DiagnosticRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for DiagnosticRing<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticRing")
            .field("capacity", &N)
            .field("head", &self.head)
            .field("wrapped", &self.wrapped)
            .finish()
    }
}

impl Replay<'_> {
    pub fn len(&self) -> usize {
        self.older.len() + self.newer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` with every line, without its newline.
    ///
    /// A line split across the two segments is joined first, truncated to
    /// [`LOG_LINE_CAPACITY`]. A trailing unterminated fragment is emitted last.
    pub fn for_each_line(&self, mut f: impl FnMut(&[u8])) -> usize {
        let mut pending: heapless::Vec<u8, LOG_LINE_CAPACITY> = heapless::Vec::new();
        let mut lines = 0;

        for segment in [self.older, self.newer] {
            let mut rest = segment;
            while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
                let line = &rest[..newline];
                if pending.is_empty() {
                    f(line);
                } else {
                    extend_truncating(&mut pending, line);
                    f(pending.as_slice());
                    pending.clear();
                }
                lines += 1;
                rest = &rest[newline + 1..];
            }
            extend_truncating(&mut pending, rest);
        }

        if !pending.is_empty() {
            f(pending.as_slice());
            lines += 1;
        }
        lines
    }
}

fn extend_truncating(pending: &mut heapless::Vec<u8, LOG_LINE_CAPACITY>, bytes: &[u8]) {
    let room = LOG_LINE_CAPACITY - pending.len();
    let _ = pending.extend_from_slice(&bytes[..bytes.len().min(room)]);
}

/// serde only covers fixed arrays up to 32 elements.
mod ring_bytes {
    use core::fmt;

    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        deserializer.deserialize_bytes(BytesVisitor::<N>)
    }

    struct BytesVisitor<const N: usize>;

    impl<'de, const N: usize> Visitor<'de> for BytesVisitor<N> {
        type Value = [u8; N];

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} bytes", N)
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            v.try_into().map_err(|_| E::invalid_length(v.len(), &self))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = [0u8; N];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(i, &self))?;
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::string::String;
    use std::vec::Vec;

    fn collect_lines<const N: usize>(ring: &DiagnosticRing<N>) -> Vec<String> {
        let mut lines = Vec::new();
        ring.replay()
            .for_each_line(|line| lines.push(String::from_utf8_lossy(line).into_owned()));
        lines
    }

    #[test]
    fn fills_without_wrapping() {
        let mut ring = DiagnosticRing::<16>::new();
        ring.append(b"one\ntwo\n");

        assert!(!ring.is_wrapped());
        assert_eq!(ring.head(), 8);
        assert_eq!(
            ring.replay(),
            Replay {
                older: &[],
                newer: b"one\ntwo\n"
            }
        );
    }

    #[test]
    fn reaching_capacity_wraps_head_to_zero() {
        let mut ring = DiagnosticRing::<8>::new();
        ring.append(b"abcdefg\n");

        assert!(ring.is_wrapped());
        assert_eq!(ring.head(), 0);
        assert_eq!(ring.len(), 8);
    }

    #[test]
    fn wrapped_replay_starts_after_first_boundary_past_head() {
        let mut ring = DiagnosticRing::<16>::new();
        ring.append(b"first line\n");
        ring.append(b"second\n");
        assert!(ring.is_wrapped());
        assert_eq!(ring.head(), 2);

        // "d\nrst line\nsecon": the remains of the first line are dropped
        let replay = ring.replay();
        assert_eq!(replay.older, b"secon");
        assert_eq!(replay.newer, b"d\n");
        assert_eq!(collect_lines(&ring), ["second"]);
    }

    #[test]
    fn partial_line_spanning_the_seam_is_skipped() {
        let mut ring = DiagnosticRing::<10>::new();
        ring.append(b"aaaaaaaaaaaa");
        ring.append(b"\nbb\n");

        // No newline in [head..], the stale fragment continues into the front
        let replay = ring.replay();
        assert!(replay.older.is_empty());
        assert_eq!(replay.newer, b"bb\n");
    }

    #[test]
    fn oversized_append_keeps_newest_bytes() {
        let mut ring = DiagnosticRing::<4>::new();
        ring.append(b"0123456789");

        assert!(ring.is_wrapped());
        assert_eq!(ring.head(), 0);
        assert_eq!(ring.buffer, *b"6789");
    }

    #[test]
    fn clear_resets_wrap_state() {
        let mut ring = DiagnosticRing::<4>::new();
        ring.append(b"0123");
        ring.clear();

        assert!(!ring.is_wrapped());
        assert!(ring.replay().is_empty());
    }

    #[test]
    fn lines_split_across_segments_are_joined() {
        let replay = Replay {
            older: b"tail\nhe",
            newer: b"llo\nworld",
        };
        let mut lines = Vec::new();
        let count = replay.for_each_line(|line| lines.push(line.to_vec()));

        assert_eq!(count, 3);
        assert_eq!(lines, [b"tail".to_vec(), b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn snapshot_encoding_preserves_contents() {
        let mut ring = DiagnosticRing::<64>::new();
        ring.append(b"kept across restarts\n");

        let bytes = postcard::to_allocvec(&ring).unwrap();
        let decoded: DiagnosticRing<64> = postcard::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, ring);
    }

    #[test]
    fn snapshot_with_wrong_capacity_is_rejected() {
        let ring = DiagnosticRing::<64>::new();
        let bytes = postcard::to_allocvec(&ring).unwrap();

        assert!(postcard::from_bytes::<DiagnosticRing<32>>(&bytes).is_err());
    }

    fn arb_lines() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-zA-Z0-9 :.\\[\\]#-]{1,60}", 1..80)
    }

    proptest! {
        #[test]
        fn replay_is_a_suffix_of_write_order(lines in arb_lines()) {
            let mut ring = DiagnosticRing::<256>::new();
            for line in &lines {
                ring.append(line.as_bytes());
                ring.append(b"\n");
            }

            let replayed = collect_lines(&ring);
            prop_assert!(!replayed.is_empty());
            prop_assert!(replayed.len() <= lines.len());
            prop_assert_eq!(&lines[lines.len() - replayed.len()..], replayed.as_slice());
        }

        #[test]
        fn unwrapped_ring_replays_everything(lines in prop::collection::vec("[a-z]{1,10}", 1..20)) {
            let mut ring = DiagnosticRing::<256>::new();
            for line in &lines {
                ring.append(line.as_bytes());
                ring.append(b"\n");
            }

            prop_assert!(!ring.is_wrapped());
            prop_assert_eq!(collect_lines(&ring), lines);
        }

        #[test]
        fn replay_never_starts_mid_line(chunks in prop::collection::vec("[a-z\n]{1,40}", 1..60)) {
            let mut ring = DiagnosticRing::<64>::new();
            let mut written = Vec::new();
            for chunk in &chunks {
                ring.append(chunk.as_bytes());
                written.extend_from_slice(chunk.as_bytes());
            }

            let replay = ring.replay();
            let mut linear = replay.older.to_vec();
            linear.extend_from_slice(replay.newer);

            prop_assert!(ring.head() < 64);
            prop_assert!(written.ends_with(&linear));
            let start = written.len() - linear.len();
            prop_assert!(linear.is_empty() || start == 0 || written[start - 1] == b'\n');
        }
    }
}
