//! Two wire-framing modes selected per transport: newline-
//! delimited JSON and 32-bit big-endian length-prefixed packets. Framing is
//! transport-owned; the protocol engine only ever sees whole messages.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Newline,
    LengthPrefixed,
}

pub fn encode_frame(payload: &[u8], framing: Framing) -> Vec<u8> {
    match framing {
        Framing::Newline => {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.extend_from_slice(payload);
            out.push(b'\n');
            out
        }
        Framing::LengthPrefixed => {
            let len = payload.len() as u32;
            let mut out = Vec::with_capacity(payload.len() + 4);
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(payload);
            out
        }
    }
}

/// Accumulates raw bytes and extracts whole frames as they complete.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    /// Feed newly-read bytes in; returns every frame that became complete.
    /// Leftover partial bytes remain buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            match self.framing {
                Framing::Newline => {
                    let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                        break;
                    };
                    let frame: Vec<u8> = self.buffer.drain(..pos).collect();
                    self.buffer.drain(..1);
                    if !frame.is_empty() {
                        frames.push(frame);
                    }
                }
                Framing::LengthPrefixed => {
                    if self.buffer.len() < 4 {
                        break;
                    }
                    let len = u32::from_be_bytes(self.buffer[0..4].try_into().unwrap()) as usize;
                    if self.buffer.len() < 4 + len {
                        break;
                    }
                    let frame = self.buffer[4..4 + len].to_vec();
                    self.buffer.drain(..4 + len);
                    frames.push(frame);
                }
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_round_trip() {
        let frame = encode_frame(b"hello", Framing::Newline);
        let mut decoder = FrameDecoder::new(Framing::Newline);
        let frames = decoder.feed(&frame);
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn length_prefixed_round_trip() {
        let frame = encode_frame(b"hello", Framing::LengthPrefixed);
        let mut decoder = FrameDecoder::new(Framing::LengthPrefixed);
        let frames = decoder.feed(&frame);
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn newline_decoder_handles_split_reads() {
        let mut decoder = FrameDecoder::new(Framing::Newline);
        assert!(decoder.feed(b"hel").is_empty());
        let frames = decoder.feed(b"lo\n");
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn length_prefixed_decoder_handles_split_reads() {
        let frame = encode_frame(b"hello world", Framing::LengthPrefixed);
        let mut decoder = FrameDecoder::new(Framing::LengthPrefixed);
        assert!(decoder.feed(&frame[..3]).is_empty());
        let frames = decoder.feed(&frame[3..]);
        assert_eq!(frames, vec![b"hello world".to_vec()]);
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut bytes = encode_frame(b"a", Framing::Newline);
        bytes.extend(encode_frame(b"b", Framing::Newline));
        let mut decoder = FrameDecoder::new(Framing::Newline);
        let frames = decoder.feed(&bytes);
        assert_eq!(frames, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
