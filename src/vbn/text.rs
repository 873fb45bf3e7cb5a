//! Line-terminator normalisation for ASCII extraction.
//!
//! VMS text can end lines with CR, LF or CR LF, and record formats add
//! their own implicit terminators on top.  Every terminator is rewritten to
//! the host convention.  A CR is held back until the next byte shows
//! whether it starts a CR LF pair, so the state survives chunk boundaries.

#[cfg(windows)]
pub const HOST_LINE_TERMINATOR: &[u8] = b"\r\n";
#[cfg(not(windows))]
pub const HOST_LINE_TERMINATOR: &[u8] = b"\n";

const CR: u8 = b'\r';
const LF: u8 = b'\n';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextState {
    /// A CR has been withheld.
    pub cr_pending:          bool,
    /// The last chunk ended with a CR or LF.
    pub last_was_terminator: bool,
    /// The last chunk contained a CR or LF anywhere.
    pub contains_terminator: bool,
}

impl TextState {
    /// Normalise `data`, appending the result to `out`.
    pub fn normalize(&mut self, data: &[u8], out: &mut Vec<u8>) {
        out.reserve(data.len());
        self.contains_terminator = false;
        self.last_was_terminator = false;

        for &b in data {
            match (b, self.cr_pending) {
                (CR, false) => {
                    self.cr_pending = true;
                }
                (LF, _) => {
                    out.extend_from_slice(HOST_LINE_TERMINATOR);
                    self.cr_pending = false;
                }
                (_, true) => {
                    // A withheld CR not followed by LF still ends the line.
                    out.extend_from_slice(HOST_LINE_TERMINATOR);
                    self.cr_pending = false;
                    out.push(b);
                }
                (_, false) => out.push(b),
            }
            self.contains_terminator |= b == CR || b == LF;
        }
        if let Some(&last) = data.last() {
            self.last_was_terminator = last == CR || last == LF;
        }
    }

    /// Data written verbatim clears the terminator bookkeeping.
    pub fn clear(&mut self) {
        self.cr_pending = false;
        self.last_was_terminator = false;
        self.contains_terminator = false;
    }

    /// Emit a CR still held back at the end of the file.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if self.cr_pending {
            out.extend_from_slice(HOST_LINE_TERMINATOR);
            self.cr_pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run<T: AsRef<[u8]>>(chunks: &[T]) -> Vec<u8> {
        let mut st = TextState::default();
        let mut out = Vec::new();
        for c in chunks {
            st.normalize(c.as_ref(), &mut out);
        }
        st.finish(&mut out);
        out
    }

    fn host(s: &str) -> Vec<u8> {
        s.bytes()
            .flat_map(|b| if b == b'\n' { HOST_LINE_TERMINATOR.to_vec() } else { vec![b] })
            .collect()
    }

    #[test]
    fn every_terminator_style_maps_to_host() {
        assert_eq!(run(&[b"A\r\nB"]), host("A\nB"));
        assert_eq!(run(&[b"A\nB"]), host("A\nB"));
        assert_eq!(run(&[b"A\rB"]), host("A\nB"));
        assert_eq!(run(&[b"A\r\rB"]), [host("A\n"), b"\rB".to_vec()].concat());
        assert_eq!(run(&[b"A\r"]), host("A\n"));
    }

    #[test]
    fn pair_split_across_chunks() {
        assert_eq!(run(&[b"A\r", b"\nB"]), host("A\nB"));
    }

    #[test]
    fn tracks_trailing_terminator() {
        let mut st = TextState::default();
        let mut out = Vec::new();
        st.normalize(b"line\r\n", &mut out);
        assert!(st.last_was_terminator && st.contains_terminator);
        st.normalize(b"x", &mut out);
        assert!(!st.last_was_terminator && !st.contains_terminator);
        st.normalize(b"", &mut out);
        assert!(!st.last_was_terminator);
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_output(
            data in proptest::collection::vec(prop_oneof![Just(b'\r'), Just(b'\n'), 0x20u8..0x7F], 0..200),
            cut in any::<prop::sample::Index>(),
        ) {
            let (a, b) = data.split_at(cut.index(data.len() + 1));
            prop_assert_eq!(run(&[a, b]), run(&[&data]));
        }

        #[test]
        fn text_without_cr_only_rewrites_lf(
            data in proptest::collection::vec(prop_oneof![Just(b'\n'), 0x20u8..0x7F], 0..200),
        ) {
            let s = String::from_utf8(data.clone()).unwrap();
            prop_assert_eq!(run(&[&data]), host(&s));
        }
    }
}
