use crate::{BitstreamError, BitstreamMetadata};

const SIGNATURES: [&[u8; 6]; 2] = [b"GIF87a", b"GIF89a"];

const EXTENSION: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const GRAPHIC_CONTROL: u8 = 0xF9;
const APPLICATION: u8 = 0xFF;

const LOOP_APPLICATION: &[u8] = b"NETSCAPE2.0";

/// Bounds-checked forward reader. Every accessor returns `None` past the end,
/// which the scan treats as truncation.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos:   usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u16_le(&mut self) -> Option<u16> {
        let raw = self.take(2)?;
        Some(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let raw = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(raw)
    }

    /// Skips a chain of length-prefixed sub-blocks up to and including the
    /// zero terminator.
    fn skip_sub_blocks(&mut self) -> Option<()> {
        loop {
            let len = self.byte()?;
            if len == 0 {
                return Some(());
            }
            self.take(usize::from(len))?;
        }
    }
}

/// Size in bytes of a color table announced by a packed descriptor byte.
fn color_table_len(packed: u8) -> Option<usize> {
    (packed & 0x80 != 0).then(|| 3 * (1 << ((packed & 0x07) + 1)))
}

#[derive(Default)]
struct Scan {
    width:            u32,
    height:           u32,
    frame_count:      usize,
    delay_cs:         u64,
    has_transparency: bool,
    looping:          bool,
    complete:         bool,
}

impl Scan {
    fn run(&mut self, bytes: &[u8]) -> Option<()> {
        let mut cur = Cursor::new(bytes, 6);

        self.width = u32::from(cur.u16_le()?);
        self.height = u32::from(cur.u16_le()?);
        let packed = cur.byte()?;
        // background color index, pixel aspect ratio
        cur.take(2)?;
        if let Some(len) = color_table_len(packed) {
            cur.take(len)?;
        }

        loop {
            match cur.byte()? {
                EXTENSION => self.extension(&mut cur)?,
                IMAGE_SEPARATOR => {
                    self.frame_count += 1;
                    // left, top, width, height
                    cur.take(8)?;
                    let packed = cur.byte()?;
                    if let Some(len) = color_table_len(packed) {
                        cur.take(len)?;
                    }
                    // LZW minimum code size
                    cur.byte()?;
                    cur.skip_sub_blocks()?;
                },
                TRAILER => {
                    self.complete = true;
                    return Some(());
                },
                _ => return None,
            }
        }
    }

    fn extension(&mut self, cur: &mut Cursor<'_>) -> Option<()> {
        match cur.byte()? {
            GRAPHIC_CONTROL => {
                let len = usize::from(cur.byte()?);
                let block = cur.take(len)?;
                if let [packed, lo, hi, ..] = *block {
                    self.delay_cs += u64::from(u16::from_le_bytes([lo, hi]));
                    self.has_transparency |= packed & 0x01 != 0;
                }
                cur.skip_sub_blocks()
            },
            APPLICATION => {
                let len = usize::from(cur.byte()?);
                if cur.take(len)? == LOOP_APPLICATION {
                    self.looping = true;
                }
                cur.skip_sub_blocks()
            },
            _ => cur.skip_sub_blocks(),
        }
    }
}

/// Parses the structure of a GIF stream.
///
/// Only a wrong signature is an error. Anything cut short or malformed after
/// it ends the scan and returns what was gathered up to that point.
pub fn read_metadata(bytes: &[u8]) -> Result<BitstreamMetadata, BitstreamError> {
    let signature = bytes.get(..6).unwrap_or(bytes);
    if !SIGNATURES.iter().any(|s| s.as_slice() == signature) {
        return Err(BitstreamError::Signature(
            String::from_utf8_lossy(signature).into_owned(),
        ));
    }

    let mut scan = Scan::default();
    // `None` here only means the stream was truncated or malformed
    let _ = scan.run(bytes);

    let duration = scan.delay_cs as f64 / 100.0;
    let fps = if scan.frame_count > 0 && duration > 0.0 {
        scan.frame_count as f64 / duration
    } else {
        0.0
    };

    Ok(BitstreamMetadata {
        width: scan.width,
        height: scan.height,
        frame_count: scan.frame_count,
        duration,
        fps,
        file_size: bytes.len(),
        has_transparency: scan.has_transparency,
        looping: scan.looping,
        complete: scan.complete,
    })
}
