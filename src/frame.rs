use bytes::{Buf, BytesMut};

/// Splits the debugger's stdout into frames.
///
/// A frame is everything that appeared before a prompt delimiter. The text
/// after the last delimiter (including a delimiter that has only partially
/// arrived) stays buffered until more output confirms where it ends.
pub struct FrameAssembler {
    prompt: Vec<u8>,
    buffer: BytesMut,
    /// Bytes of `buffer` known not to start a delimiter.
    scanned: usize,
}

impl FrameAssembler {
    pub fn new(prompt: impl Into<String>) -> Self {
        let prompt: String = prompt.into();
        assert!(!prompt.is_empty(), "the prompt delimiter must not be empty");
        FrameAssembler {
            prompt: prompt.into_bytes(),
            buffer: BytesMut::with_capacity(4096),
            scanned: 0,
        }
    }

    /// Append `chunk` and return all frames completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = vec![];
        while let Some(offset) = find(&self.buffer[self.scanned..], &self.prompt) {
            let frame = self.buffer.split_to(self.scanned + offset);
            self.buffer.advance(self.prompt.len());
            self.scanned = 0;
            frames.push(String::from_utf8_lossy(&frame).into_owned());
        }
        // A delimiter may still complete in the last `prompt.len() - 1` bytes.
        self.scanned = self.buffer.len().saturating_sub(self.prompt.len() - 1);
        frames
    }

    /// Text received after the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Flush whatever is left once the stream closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        self.scanned = 0;
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PROMPT: &str = "(mdd) ";

    #[test]
    fn test_holds_back_incomplete_frame() {
        let mut assembler = FrameAssembler::new(PROMPT);
        assert!(assembler.feed(b"Hit breakpoint 1 at a.mc:11\r\n").is_empty());
        assert!(assembler.feed(b"(md").is_empty());
        assert_eq!(
            assembler.feed(b"d) "),
            vec!["Hit breakpoint 1 at a.mc:11\r\n".to_string()],
        );
        assert!(assembler.pending().is_empty());
    }

    #[test]
    fn test_several_frames_in_one_chunk() {
        let mut assembler = FrameAssembler::new(PROMPT);
        let frames = assembler.feed(b"(mdd) Locals:\n  x = 1 (Lang.Number)\n(mdd) #0 x at a.mc:3");
        assert_eq!(
            frames,
            vec!["".to_string(), "Locals:\n  x = 1 (Lang.Number)\n".to_string()],
        );
        assert_eq!(assembler.pending(), b"#0 x at a.mc:3");
        assert_eq!(assembler.finish().as_deref(), Some("#0 x at a.mc:3"));
        assert_eq!(assembler.finish(), None);
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let mut assembler = FrameAssembler::new(PROMPT);
        let text = "s = \"größe\"\n(mdd) ".as_bytes();
        let split = text.iter().position(|it| *it == 0xC3).unwrap() + 1;
        assert!(assembler.feed(&text[..split]).is_empty());
        assert_eq!(assembler.feed(&text[split..]), vec!["s = \"größe\"\n".to_string()]);
    }

    #[test]
    fn test_byte_wise_reads_resume_scanning() {
        let mut assembler = FrameAssembler::new(PROMPT);
        let dump = format!("{}\n", "x".repeat(1000));
        for byte in dump.as_bytes() {
            assert!(assembler.feed(&[*byte]).is_empty());
        }
        assert_eq!(assembler.scanned, dump.len() - (PROMPT.len() - 1));

        for byte in PROMPT.as_bytes() {
            let frames = assembler.feed(&[*byte]);
            if !frames.is_empty() {
                assert_eq!(frames, vec![dump.clone()]);
            }
        }
        assert!(assembler.pending().is_empty());
        assert_eq!(assembler.scanned, 0);
    }

    proptest! {
        #[test]
        fn test_chunking_does_not_change_frames(
            segments in prop::collection::vec("[a-z#=:. \n()0-9]{0,12}", 0..8),
            tail in "[a-z \n]{0,6}",
            cuts in prop::collection::vec(0usize..200, 0..10),
        ) {
            let segments: Vec<String> = segments
                .into_iter()
                .filter(|it| !it.contains(PROMPT))
                .collect();
            let mut input = String::new();
            for segment in &segments {
                input.push_str(segment);
                input.push_str(PROMPT);
            }
            input.push_str(&tail);
            let bytes = input.as_bytes();

            let mut cuts: Vec<usize> = cuts.into_iter().map(|it| it.min(bytes.len())).collect();
            cuts.push(0);
            cuts.push(bytes.len());
            cuts.sort_unstable();
            cuts.dedup();

            let mut assembler = FrameAssembler::new(PROMPT);
            let mut frames = vec![];
            for window in cuts.windows(2) {
                frames.extend(assembler.feed(&bytes[window[0]..window[1]]));
            }

            prop_assert_eq!(frames.len(), segments.len());
            let mut rebuilt: String = frames.iter().map(|it| format!("{it}{PROMPT}")).collect();
            rebuilt.push_str(&String::from_utf8_lossy(assembler.pending()));
            prop_assert_eq!(rebuilt, input);
        }
    }
}
