use std::collections::{HashMap, VecDeque};

use bytes_util::ByteCursor;
use tracing::debug;

use crate::error::{Mp4Error, Result};
use crate::fourcc::FourCc;

/// Outcome of parsing from a buffer that may still be growing.
#[derive(Debug)]
pub enum ParseResult<T> {
    Ok(T),
    /// The buffer ends before the item does and the stream is not complete.
    NeedMoreData,
    Error(Mp4Error),
}

impl<T> ParseResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ParseResult::Ok(_))
    }

    pub fn is_need_more_data(&self) -> bool {
        matches!(self, ParseResult::NeedMoreData)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ParseResult::Error(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<U> {
        match self {
            ParseResult::Ok(value) => ParseResult::Ok(f(value)),
            ParseResult::NeedMoreData => ParseResult::NeedMoreData,
            ParseResult::Error(err) => ParseResult::Error(err),
        }
    }

    /// Folds the three outcomes into a `Result`, with `NeedMoreData` as `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            ParseResult::Ok(value) => Ok(Some(value)),
            ParseResult::NeedMoreData => Ok(None),
            ParseResult::Error(err) => Err(err),
        }
    }
}

/// Size and type of a box, as read from the front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: FourCc,
    /// Total size including the header.
    pub size: u64,
    /// 8, or 16 when a 64-bit size follows the type.
    pub header_size: u64,
}

impl BoxHeader {
    /// Reads the header at the start of `buf`.
    ///
    /// When `is_eos` is false the buffer may be a prefix of the stream, so a
    /// short buffer means more data is needed. Once the stream is complete the
    /// same conditions are errors. The box body itself is only required to be
    /// present when `is_eos` is set.
    pub fn parse(buf: &[u8], is_eos: bool) -> ParseResult<Self> {
        let short = || {
            if is_eos {
                ParseResult::Error(Mp4Error::TruncatedHeader)
            } else {
                ParseResult::NeedMoreData
            }
        };

        let mut cursor = ByteCursor::new(buf);
        let (Ok(size32), Ok(box_type)) = (cursor.read_u32(), cursor.read_fourcc()) else {
            return short();
        };
        let box_type = FourCc(box_type);
        let mut header_size = 8;

        let size = match size32 {
            0 if is_eos => buf.len() as u64,
            0 => return ParseResult::Error(Mp4Error::BoxRunsToEndOfStream(box_type)),
            1 => {
                let Ok(large) = cursor.read_u64() else {
                    return short();
                };
                header_size = 16;
                large
            }
            size => size as u64,
        };

        // Boxes of 2 GiB and more are not supported.
        if size < header_size || size > i32::MAX as u64 {
            return ParseResult::Error(Mp4Error::InvalidBoxSize { box_type, size });
        }

        if is_eos && size > buf.len() as u64 {
            return ParseResult::Error(Mp4Error::TruncatedBox { box_type, size });
        }

        ParseResult::Ok(Self {
            box_type,
            size,
            header_size,
        })
    }
}

/// Box types accepted at the top level of a fragmented stream.
pub fn is_valid_top_level_box(box_type: FourCc) -> bool {
    matches!(
        box_type,
        FourCc::FTYP
            | FourCc::PDIN
            | FourCc::BLOC
            | FourCc::MOOV
            | FourCc::MOOF
            | FourCc::MFRA
            | FourCc::MDAT
            | FourCc::FREE
            | FourCc::SKIP
            | FourCc::META
            | FourCc::MECO
            | FourCc::STYP
            | FourCc::SIDX
            | FourCc::SSIX
            | FourCc::PRFT
            | FourCc::UUID
            | FourCc::EMSG
    )
}

/// A box type that knows how to parse itself from a [`BoxReader`].
pub trait ParseBox: Sized {
    const BOX_TYPE: FourCc;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self>;
}

/// Reads the body of one box and gives access to its children.
///
/// Children are indexed by [`scan_children`](Self::scan_children) and are
/// consumed as they are read, so reading the same type again yields the next
/// box of that type in file order.
#[derive(Debug, Clone)]
pub struct BoxReader<'a> {
    data: &'a [u8],
    box_type: FourCc,
    cursor: ByteCursor<'a>,
    version: u8,
    flags: u32,
    scanned: bool,
    children: HashMap<FourCc, VecDeque<BoxReader<'a>>>,
}

impl<'a> BoxReader<'a> {
    fn from_header(buf: &'a [u8], header: BoxHeader) -> Self {
        let data = &buf[..header.size as usize];
        let mut cursor = ByteCursor::new(data);
        cursor.set_position(header.header_size as usize);
        Self {
            data,
            box_type: header.box_type,
            cursor,
            version: 0,
            flags: 0,
            scanned: false,
            children: HashMap::new(),
        }
    }

    fn child(buf: &'a [u8]) -> Result<Self> {
        match BoxHeader::parse(buf, true) {
            ParseResult::Ok(header) => Ok(Self::from_header(buf, header)),
            ParseResult::NeedMoreData => Err(Mp4Error::TruncatedHeader),
            ParseResult::Error(err) => Err(err),
        }
    }

    /// Reads the header of the top-level box at the start of `buf` without
    /// requiring its body to be buffered.
    pub fn start_top_level(buf: &[u8], is_eos: bool) -> ParseResult<BoxHeader> {
        let header = match BoxHeader::parse(buf, is_eos) {
            ParseResult::Ok(header) => header,
            other => return other,
        };
        if !is_valid_top_level_box(header.box_type) {
            debug!("Unrecognized top-level box type {}", header.box_type);
            return ParseResult::Error(Mp4Error::InvalidTopLevelBox(header.box_type));
        }
        ParseResult::Ok(header)
    }

    /// Returns a reader for the top-level box at the start of `buf` once the
    /// whole box is buffered.
    pub fn read_top_level(buf: &'a [u8], is_eos: bool) -> ParseResult<Self> {
        let header = match Self::start_top_level(buf, is_eos) {
            ParseResult::Ok(header) => header,
            ParseResult::NeedMoreData => return ParseResult::NeedMoreData,
            ParseResult::Error(err) => return ParseResult::Error(err),
        };
        if header.size > buf.len() as u64 {
            return ParseResult::NeedMoreData;
        }
        ParseResult::Ok(Self::from_header(buf, header))
    }

    /// Wraps a buffer of back-to-back boxes, such as `pssh` init data, in a
    /// reader with a null type, as if the buffer were the body of a parent.
    pub fn read_concatenated_boxes(buf: &'a [u8]) -> Self {
        Self::from_header(
            buf,
            BoxHeader {
                box_type: FourCc::NULL,
                size: buf.len() as u64,
                header_size: 0,
            },
        )
    }

    pub fn box_type(&self) -> FourCc {
        self.box_type
    }

    /// Total size of the box including its header.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Position within the box, counted from the first header byte.
    pub fn pos(&self) -> usize {
        self.cursor.position()
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The complete box, header included.
    pub fn raw_box(&self) -> &'a [u8] {
        self.data
    }

    /// Cursor over the unread part of the body.
    pub fn cursor(&mut self) -> &mut ByteCursor<'a> {
        &mut self.cursor
    }

    pub fn has_bytes(&self, count: usize) -> bool {
        self.cursor.has_bytes(count)
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Reads the version and flags of a full box.
    pub fn read_full_box_header(&mut self) -> Result<()> {
        let vflags = self.cursor.read_u32()?;
        self.version = (vflags >> 24) as u8;
        self.flags = vflags & 0x00ff_ffff;
        Ok(())
    }

    /// Indexes every child box in the rest of the body.
    pub fn scan_children(&mut self) -> Result<()> {
        if self.scanned {
            return Ok(());
        }
        self.scanned = true;

        while self.cursor.remaining() > 0 {
            let child = Self::child(self.cursor.remaining_slice())?;
            self.cursor.skip(child.size())?;
            self.children
                .entry(child.box_type)
                .or_default()
                .push_back(child);
        }
        Ok(())
    }

    pub fn has_child(&self, box_type: FourCc) -> bool {
        self.children
            .get(&box_type)
            .is_some_and(|children| !children.is_empty())
    }

    /// Removes and returns the next unread child of `box_type`.
    pub fn take_child(&mut self, box_type: FourCc) -> Option<BoxReader<'a>> {
        self.children.get_mut(&box_type)?.pop_front()
    }

    pub fn read_child<T: ParseBox>(&mut self) -> Result<T> {
        self.maybe_read_child()?.ok_or(Mp4Error::MissingChild {
            parent: self.box_type,
            child: T::BOX_TYPE,
        })
    }

    pub fn maybe_read_child<T: ParseBox>(&mut self) -> Result<Option<T>> {
        match self.take_child(T::BOX_TYPE) {
            Some(mut child) => Ok(Some(T::parse(&mut child)?)),
            None => Ok(None),
        }
    }

    /// Reads every child of type `T`; at least one must be present.
    pub fn read_children<T: ParseBox>(&mut self) -> Result<Vec<T>> {
        let children = self.maybe_read_children()?;
        if children.is_empty() {
            return Err(Mp4Error::MissingChild {
                parent: self.box_type,
                child: T::BOX_TYPE,
            });
        }
        Ok(children)
    }

    pub fn maybe_read_children<T: ParseBox>(&mut self) -> Result<Vec<T>> {
        let Some(children) = self.children.remove(&T::BOX_TYPE) else {
            return Ok(Vec::new());
        };
        children
            .into_iter()
            .map(|mut child| T::parse(&mut child))
            .collect()
    }

    /// Parses every box in the rest of the body with `parse`, in file order.
    /// The body is not scanned for children afterwards.
    pub fn read_all_children_with<T>(
        &mut self,
        mut parse: impl FnMut(&mut BoxReader<'a>) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.scanned = true;
        let mut out = Vec::new();
        while self.cursor.remaining() > 0 {
            let mut child = Self::child(self.cursor.remaining_slice())?;
            self.cursor.skip(child.size())?;
            out.push(parse(&mut child)?);
        }
        Ok(out)
    }

    pub fn read_all_children<T: ParseBox>(&mut self) -> Result<Vec<T>> {
        self.read_all_children_with(|child| T::parse(child))
    }

    /// Like [`read_all_children`](Self::read_all_children), but every child
    /// must be of type `T`.
    pub fn read_all_children_and_check_fourcc<T: ParseBox>(&mut self) -> Result<Vec<T>> {
        let parent = self.box_type;
        self.read_all_children_with(|child| {
            if child.box_type() != T::BOX_TYPE {
                return Err(Mp4Error::UnexpectedChild {
                    parent,
                    expected: T::BOX_TYPE,
                    found: child.box_type(),
                });
            }
            T::parse(child)
        })
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;
    use crate::test_support::{make_box, make_full_box};

    #[derive(Debug, PartialEq)]
    struct Skip(u32);

    impl ParseBox for Skip {
        const BOX_TYPE: FourCc = FourCc::SKIP;

        fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
            Ok(Skip(reader.cursor().read_u32()?))
        }
    }

    #[test]
    fn test_truncated_header() {
        let buf = [0, 0, 0, 16];
        assert!(BoxHeader::parse(&buf, false).is_need_more_data());
        assert!(matches!(
            BoxHeader::parse(&buf, true),
            ParseResult::Error(Mp4Error::TruncatedHeader)
        ));
    }

    #[test]
    fn test_header_sizes() {
        let header = BoxHeader::parse(&make_box(b"free", &[0; 4]), false);
        assert!(matches!(
            header,
            ParseResult::Ok(BoxHeader { size: 12, header_size: 8, .. })
        ));

        let mut large = vec![0, 0, 0, 1];
        large.extend_from_slice(b"mdat");
        large.extend_from_slice(&20u64.to_be_bytes());
        large.extend_from_slice(&[0; 4]);
        let ParseResult::Ok(header) = BoxHeader::parse(&large, true) else {
            panic!("expected a header");
        };
        assert_eq!(header.size, 20);
        assert_eq!(header.header_size, 16);

        assert!(BoxHeader::parse(&large[..12], false).is_need_more_data());
    }

    #[test]
    fn test_size_zero_runs_to_end() {
        let mut buf = vec![0, 0, 0, 0];
        buf.extend_from_slice(b"mdat");
        buf.extend_from_slice(&[1, 2, 3]);
        let ParseResult::Ok(header) = BoxHeader::parse(&buf, true) else {
            panic!("expected a header");
        };
        assert_eq!(header.size, 11);
        assert!(matches!(
            BoxHeader::parse(&buf, false),
            ParseResult::Error(Mp4Error::BoxRunsToEndOfStream(FourCc::MDAT))
        ));
    }

    #[test]
    fn test_invalid_sizes() {
        let mut buf = vec![0, 0, 0, 4];
        buf.extend_from_slice(b"free");
        assert!(BoxHeader::parse(&buf, false).is_error());

        let mut huge = vec![0x80, 0, 0, 0];
        huge.extend_from_slice(b"mdat");
        assert!(BoxHeader::parse(&huge, false).is_error());
    }

    #[test]
    fn test_body_beyond_buffer() {
        let data = make_box(b"moov", &[0; 16]);
        assert!(BoxHeader::parse(&data[..12], false).is_ok());
        assert!(BoxReader::read_top_level(&data[..12], false).is_need_more_data());
        assert!(matches!(
            BoxReader::read_top_level(&data[..12], true),
            ParseResult::Error(Mp4Error::TruncatedBox { size: 24, .. })
        ));
        assert!(BoxReader::read_top_level(&data, false).is_ok());
    }

    #[test]
    fn test_top_level_whitelist() {
        let data = make_box(b"trak", &[]);
        assert!(matches!(
            BoxReader::start_top_level(&data, false),
            ParseResult::Error(Mp4Error::InvalidTopLevelBox(FourCc::TRAK))
        ));
        assert!(BoxReader::start_top_level(&make_box(b"styp", &[]), false).is_ok());
    }

    #[test]
    fn test_children() {
        let mut body = make_box(b"skip", &1u32.to_be_bytes());
        body.extend(make_box(b"free", &[]));
        body.extend(make_box(b"skip", &2u32.to_be_bytes()));
        let data = make_box(b"moov", &body);

        let ParseResult::Ok(mut reader) = BoxReader::read_top_level(&data, true) else {
            panic!("expected a reader");
        };
        reader.scan_children().unwrap();
        assert!(reader.has_child(FourCc::FREE));
        assert_eq!(reader.read_child::<Skip>().unwrap(), Skip(1));
        assert_eq!(reader.maybe_read_children::<Skip>().unwrap(), vec![Skip(2)]);
        assert!(reader.maybe_read_child::<Skip>().unwrap().is_none());
        assert!(matches!(
            reader.read_child::<Skip>(),
            Err(Mp4Error::MissingChild { parent: FourCc::MOOV, child: FourCc::SKIP })
        ));
    }

    #[test]
    fn test_child_overrunning_parent() {
        let mut body = vec![0, 0, 0, 32];
        body.extend_from_slice(b"skip");
        let data = make_box(b"moov", &body);
        let ParseResult::Ok(mut reader) = BoxReader::read_top_level(&data, false) else {
            panic!("expected a reader");
        };
        assert!(reader.scan_children().is_err());
    }

    #[test]
    fn test_read_all_children_and_check_fourcc() {
        let mut body = make_box(b"skip", &7u32.to_be_bytes());
        body.extend(make_box(b"skip", &8u32.to_be_bytes()));
        let data = make_box(b"moov", &body);
        let ParseResult::Ok(mut reader) = BoxReader::read_top_level(&data, true) else {
            panic!("expected a reader");
        };
        assert_eq!(
            reader.read_all_children_and_check_fourcc::<Skip>().unwrap(),
            vec![Skip(7), Skip(8)]
        );

        let mut body = make_box(b"skip", &7u32.to_be_bytes());
        body.extend(make_box(b"free", &[0; 4]));
        let data = make_box(b"moov", &body);
        let ParseResult::Ok(mut reader) = BoxReader::read_top_level(&data, true) else {
            panic!("expected a reader");
        };
        assert!(matches!(
            reader.read_all_children_and_check_fourcc::<Skip>(),
            Err(Mp4Error::UnexpectedChild { found: FourCc::FREE, .. })
        ));
    }

    #[test]
    fn test_full_box_header_and_concatenated() {
        let mut data = make_full_box(b"skip", 1, 0x000102, &[]);
        data.extend(make_box(b"free", &[]));
        let mut reader = BoxReader::read_concatenated_boxes(&data);
        assert_eq!(reader.box_type(), FourCc::NULL);
        reader.scan_children().unwrap();
        let mut skip = reader.take_child(FourCc::SKIP).unwrap();
        skip.read_full_box_header().unwrap();
        assert_eq!(skip.version(), 1);
        assert_eq!(skip.flags(), 0x102);
        assert_eq!(skip.pos(), 12);
        assert!(reader.has_child(FourCc::FREE));
    }
}
