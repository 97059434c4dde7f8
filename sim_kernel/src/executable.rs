//! PEX executable format parser.
//!
//! ## Format
//!
//! The PEX format is intentionally simple. All integers are little-endian.
//! - Magic number: 0x50455800 (PEX\0)
//! - Version: u32
//! - Entry point: u64 (virtual address)
//! - Section count: u32
//! - For each section:
//!   - Type: u32 (1=text, 2=data, 3=bss)
//!   - Size: u64, a multiple of the page size
//!   - Permissions: u32 (bitfield: read=1, write=2, execute=4)
//!   - Data: `size` bytes for text/data, nothing for bss
//!
//! Sections are laid out in file order, back to back, starting at
//! [`USER_IMAGE_BASE`]. The entry point must fall inside an executable
//! text section.

use core_types::{MemoryPerms, RegionKind, PAGE_SIZE, USER_IMAGE_BASE};
use kernel_api::{ExecutableParser, FormatError, LoadPlan, Segment};

/// PEX magic number: "PEX\0"
pub const PEX_MAGIC: u32 = 0x50455800;

/// Current PEX format version
pub const PEX_VERSION: u32 = 1;

/// Bytes in the fixed header
pub const HEADER_LEN: usize = 20;

/// Section type codes
const SECTION_TEXT: u32 = 1;
const SECTION_DATA: u32 = 2;
const SECTION_BSS: u32 = 3;

fn section_kind(code: u32) -> Result<RegionKind, FormatError> {
    match code {
        SECTION_TEXT => Ok(RegionKind::Text),
        SECTION_DATA => Ok(RegionKind::Data),
        SECTION_BSS => Ok(RegionKind::Bss),
        other => Err(FormatError::InvalidSectionType(other)),
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let end = self.offset.checked_add(len).ok_or(FormatError::Truncated)?;
        let bytes = self.data.get(self.offset..end).ok_or(FormatError::Truncated)?;
        self.offset = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, FormatError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }
}

/// Parser for PEX images
#[derive(Debug, Clone)]
pub struct PexParser {
    max_image_size: usize,
}

impl PexParser {
    /// Creates a parser rejecting images that map more than `max_image_size` bytes
    pub fn new(max_image_size: usize) -> Self {
        Self { max_image_size }
    }
}

impl ExecutableParser for PexParser {
    fn parse(&self, image: &[u8]) -> Result<LoadPlan, FormatError> {
        if image.is_empty() {
            return Err(FormatError::Empty);
        }

        let mut reader = Reader {
            data: image,
            offset: 0,
        };

        let magic = reader.u32()?;
        if magic != PEX_MAGIC {
            return Err(FormatError::InvalidMagic(magic));
        }
        let version = reader.u32()?;
        if version != PEX_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let entry_point = reader.u64()?;
        let section_count = reader.u32()?;

        let mut segments = Vec::new();
        let mut vaddr = USER_IMAGE_BASE;
        let mut mapped: u64 = 0;

        for _ in 0..section_count {
            let kind = section_kind(reader.u32()?)?;
            let size = reader.u64()?;
            let perms = MemoryPerms::from_bits(reader.u32()?);

            if size % PAGE_SIZE as u64 != 0 {
                return Err(FormatError::InvalidAlignment(size));
            }
            mapped = mapped.saturating_add(size);
            if mapped > self.max_image_size as u64 {
                return Err(FormatError::ImageTooLarge(mapped));
            }
            // Bounded by max_image_size above
            let mem_size = size as usize;

            let (file_offset, file_len) = if kind == RegionKind::Bss {
                (reader.offset, 0)
            } else {
                let offset = reader.offset;
                reader.take(mem_size)?;
                (offset, mem_size)
            };

            segments.push(Segment {
                kind,
                vaddr,
                mem_size,
                file_offset,
                file_len,
                perms,
            });
            vaddr += size;
        }

        let text: Vec<&Segment> = segments
            .iter()
            .filter(|s| s.kind == RegionKind::Text)
            .collect();
        if text.is_empty() {
            return Err(FormatError::MissingText);
        }
        if !text
            .iter()
            .any(|s| s.perms.execute && s.contains(entry_point))
        {
            return Err(FormatError::InvalidEntryPoint(entry_point));
        }

        Ok(LoadPlan {
            entry_point,
            segments,
        })
    }
}

/// Builds PEX images for tests and demos
#[derive(Debug, Clone)]
pub struct PexImage {
    entry_point: u64,
    version: u32,
    sections: Vec<(u32, u64, u32, Vec<u8>)>,
}

impl PexImage {
    /// Starts an image with the given entry point
    pub fn new(entry_point: u64) -> Self {
        Self {
            entry_point,
            version: PEX_VERSION,
            sections: Vec::new(),
        }
    }

    /// A one-section program whose entry is the first byte of `code`
    pub fn program(code: &[u8]) -> Vec<u8> {
        Self::new(USER_IMAGE_BASE).text(code).build()
    }

    /// Overrides the format version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Appends a read/execute text section, padded to whole pages
    pub fn text(self, code: &[u8]) -> Self {
        self.loaded(SECTION_TEXT, code, MemoryPerms::read_execute())
    }

    /// Appends a read/write data section, padded to whole pages
    pub fn data(self, bytes: &[u8]) -> Self {
        self.loaded(SECTION_DATA, bytes, MemoryPerms::read_write())
    }

    /// Appends a zero-filled section of `pages` pages
    pub fn bss(mut self, pages: usize) -> Self {
        self.sections.push((
            SECTION_BSS,
            (pages * PAGE_SIZE) as u64,
            MemoryPerms::read_write().bits(),
            Vec::new(),
        ));
        self
    }

    /// Appends a section verbatim, without padding or validation
    pub fn raw_section(mut self, code: u32, size: u64, perms: u32, data: Vec<u8>) -> Self {
        self.sections.push((code, size, perms, data));
        self
    }

    fn loaded(mut self, code: u32, bytes: &[u8], perms: MemoryPerms) -> Self {
        let size = bytes.len().max(1).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let mut data = bytes.to_vec();
        data.resize(size, 0);
        self.sections.push((code, size as u64, perms.bits(), data));
        self
    }

    /// Serializes the image
    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&PEX_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.entry_point.to_le_bytes());
        buf.extend_from_slice(&(self.sections.len() as u32).to_le_bytes());
        for (code, size, perms, data) in &self.sections {
            buf.extend_from_slice(&code.to_le_bytes());
            buf.extend_from_slice(&size.to_le_bytes());
            buf.extend_from_slice(&perms.to_le_bytes());
            buf.extend_from_slice(data);
        }
        buf
    }
}
