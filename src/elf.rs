// ignition/src/elf.rs
// ELF64 header parsing and identity validation

use core::fmt;

/// Size of the fixed ELF64 file header.
pub const HEADER_LEN: usize = 64;
/// Nominal size of one ELF64 program header record. The on-disk stride
/// (`e_phentsize`) may be larger; it is never allowed to be smaller.
pub const PROGRAM_HEADER_LEN: usize = 56;

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const CLASS_64: u8 = 2;
pub const DATA_LITTLE_ENDIAN: u8 = 1;
pub const TYPE_EXECUTABLE: u16 = 2;
pub const MACHINE_X86_64: u16 = 62;
pub const VERSION_CURRENT: u32 = 1;

/// Why an image header was rejected. One variant per identity check so the
/// diagnostic names the first check that failed; the boot gate itself is
/// all-or-nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    Truncated,
    BadMagic([u8; 4]),
    UnsupportedClass(u8),
    UnsupportedByteOrder(u8),
    NotExecutable(u16),
    UnsupportedMachine(u16),
    UnsupportedVersion(u32),
    BadTableStride(u16),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Truncated => write!(f, "image shorter than the fixed header"),
            ValidationError::BadMagic(m) => write!(f, "bad magic {:02x?}", m),
            ValidationError::UnsupportedClass(c) => write!(f, "unsupported class {} (need 64-bit)", c),
            ValidationError::UnsupportedByteOrder(d) => {
                write!(f, "unsupported byte order {} (need little-endian)", d)
            }
            ValidationError::NotExecutable(t) => write!(f, "object type {} is not an executable", t),
            ValidationError::UnsupportedMachine(m) => write!(f, "unsupported machine {:#x}", m),
            ValidationError::UnsupportedVersion(v) => write!(f, "unsupported format version {}", v),
            ValidationError::BadTableStride(s) => {
                write!(f, "program header stride {} below record size", s)
            }
        }
    }
}

/// Parsed fixed-size ELF64 header. Fields are extracted verbatim; identity
/// checks live in [`ImageHeader::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: [u8; 4],
    pub class: u8,
    pub byte_order: u8,
    pub object_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub ph_offset: u64,
    pub ph_entry_size: u16,
    pub ph_count: u16,
}

impl ImageHeader {
    /// Extract header fields from the first [`HEADER_LEN`] bytes of an image.
    /// Fails only if the buffer is too short; field values are not judged.
    pub fn parse(raw: &[u8]) -> Result<Self, ValidationError> {
        if raw.len() < HEADER_LEN {
            return Err(ValidationError::Truncated);
        }
        Ok(Self {
            magic: [raw[0], raw[1], raw[2], raw[3]],
            class: raw[4],
            byte_order: raw[5],
            object_type: read_u16(raw, 16),
            machine: read_u16(raw, 18),
            version: read_u32(raw, 20),
            entry: read_u64(raw, 24),
            ph_offset: read_u64(raw, 32),
            ph_entry_size: read_u16(raw, 54),
            ph_count: read_u16(raw, 56),
        })
    }

    /// The six identity checks, in order. All must hold for the image to be
    /// accepted; the first failure is reported.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.magic != ELF_MAGIC {
            return Err(ValidationError::BadMagic(self.magic));
        }
        if self.class != CLASS_64 {
            return Err(ValidationError::UnsupportedClass(self.class));
        }
        if self.byte_order != DATA_LITTLE_ENDIAN {
            return Err(ValidationError::UnsupportedByteOrder(self.byte_order));
        }
        if self.object_type != TYPE_EXECUTABLE {
            return Err(ValidationError::NotExecutable(self.object_type));
        }
        if self.machine != MACHINE_X86_64 {
            return Err(ValidationError::UnsupportedMachine(self.machine));
        }
        if self.version != VERSION_CURRENT {
            return Err(ValidationError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Program header kind tag. Only [`SegmentKind::Load`] participates in
/// mapping; every other kind is inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Null,
    Load,
    Dynamic,
    Interp,
    Note,
    Shlib,
    ProgramHeaders,
    Tls,
    Other(u32),
}

impl SegmentKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => SegmentKind::Null,
            1 => SegmentKind::Load,
            2 => SegmentKind::Dynamic,
            3 => SegmentKind::Interp,
            4 => SegmentKind::Note,
            5 => SegmentKind::Shlib,
            6 => SegmentKind::ProgramHeaders,
            7 => SegmentKind::Tls,
            other => SegmentKind::Other(other),
        }
    }
}

/// One row of the program header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub kind: SegmentKind,
    pub file_offset: u64,
    pub file_size: u64,
    pub phys_addr: u64,
    pub mem_size: u64,
}

/// Fixed-stride iterator over a raw program header table blob.
///
/// Entry boundaries are computed from the format-declared stride, not from
/// the nominal record size: `e_phentsize` may exceed
/// [`PROGRAM_HEADER_LEN`] and the excess bytes are skipped.
pub struct ProgramHeaders<'a> {
    table: &'a [u8],
    count: usize,
    stride: usize,
    index: usize,
}

impl<'a> ProgramHeaders<'a> {
    pub fn new(table: &'a [u8], count: usize, stride: usize) -> Result<Self, ValidationError> {
        if stride < PROGRAM_HEADER_LEN {
            return Err(ValidationError::BadTableStride(stride as u16));
        }
        if table.len() < count * stride {
            return Err(ValidationError::Truncated);
        }
        Ok(Self { table, count, stride, index: 0 })
    }
}

impl Iterator for ProgramHeaders<'_> {
    type Item = SegmentDescriptor;

    fn next(&mut self) -> Option<SegmentDescriptor> {
        if self.index >= self.count {
            return None;
        }
        let entry = &self.table[self.index * self.stride..];
        self.index += 1;
        Some(SegmentDescriptor {
            kind: SegmentKind::from_raw(read_u32(entry, 0)),
            file_offset: read_u64(entry, 8),
            phys_addr: read_u64(entry, 24),
            file_size: read_u64(entry, 32),
            mem_size: read_u64(entry, 40),
        })
    }
}

fn read_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn read_u32(raw: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(raw: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn well_formed_header() -> [u8; HEADER_LEN] {
        let mut raw = [0u8; HEADER_LEN];
        raw[..4].copy_from_slice(&ELF_MAGIC);
        raw[4] = CLASS_64;
        raw[5] = DATA_LITTLE_ENDIAN;
        raw[16..18].copy_from_slice(&TYPE_EXECUTABLE.to_le_bytes());
        raw[18..20].copy_from_slice(&MACHINE_X86_64.to_le_bytes());
        raw[20..24].copy_from_slice(&VERSION_CURRENT.to_le_bytes());
        raw[24..32].copy_from_slice(&0x20_0000u64.to_le_bytes()); // entry
        raw[32..40].copy_from_slice(&(HEADER_LEN as u64).to_le_bytes()); // phoff
        raw[54..56].copy_from_slice(&(PROGRAM_HEADER_LEN as u16).to_le_bytes());
        raw[56..58].copy_from_slice(&1u16.to_le_bytes());
        raw
    }

    #[test]
    fn parse_echoes_fields() {
        let header = ImageHeader::parse(&well_formed_header()).unwrap();
        assert_eq!(header.magic, ELF_MAGIC);
        assert_eq!(header.class, CLASS_64);
        assert_eq!(header.byte_order, DATA_LITTLE_ENDIAN);
        assert_eq!(header.object_type, TYPE_EXECUTABLE);
        assert_eq!(header.machine, MACHINE_X86_64);
        assert_eq!(header.version, VERSION_CURRENT);
        assert_eq!(header.entry, 0x20_0000);
        assert_eq!(header.ph_offset, HEADER_LEN as u64);
        assert_eq!(header.ph_entry_size, PROGRAM_HEADER_LEN as u16);
        assert_eq!(header.ph_count, 1);
        assert_eq!(header.validate(), Ok(()));
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert_eq!(
            ImageHeader::parse(&[0u8; HEADER_LEN - 1]),
            Err(ValidationError::Truncated)
        );
    }

    #[test]
    fn each_identity_check_is_mandatory() {
        let mut raw = well_formed_header();
        raw[0] = 0x7E;
        let header = ImageHeader::parse(&raw).unwrap();
        assert!(matches!(header.validate(), Err(ValidationError::BadMagic(_))));

        let mut raw = well_formed_header();
        raw[4] = 1; // 32-bit class
        let header = ImageHeader::parse(&raw).unwrap();
        assert_eq!(header.validate(), Err(ValidationError::UnsupportedClass(1)));

        let mut raw = well_formed_header();
        raw[5] = 2; // big-endian
        let header = ImageHeader::parse(&raw).unwrap();
        assert_eq!(header.validate(), Err(ValidationError::UnsupportedByteOrder(2)));

        let mut raw = well_formed_header();
        raw[16..18].copy_from_slice(&3u16.to_le_bytes()); // shared object
        let header = ImageHeader::parse(&raw).unwrap();
        assert_eq!(header.validate(), Err(ValidationError::NotExecutable(3)));

        let mut raw = well_formed_header();
        raw[18..20].copy_from_slice(&183u16.to_le_bytes()); // aarch64
        let header = ImageHeader::parse(&raw).unwrap();
        assert_eq!(header.validate(), Err(ValidationError::UnsupportedMachine(183)));

        let mut raw = well_formed_header();
        raw[20..24].copy_from_slice(&2u32.to_le_bytes());
        let header = ImageHeader::parse(&raw).unwrap();
        assert_eq!(header.validate(), Err(ValidationError::UnsupportedVersion(2)));
    }

    fn encode_segment(kind: u32, offset: u64, filesz: u64, paddr: u64, memsz: u64) -> [u8; PROGRAM_HEADER_LEN] {
        let mut raw = [0u8; PROGRAM_HEADER_LEN];
        raw[0..4].copy_from_slice(&kind.to_le_bytes());
        raw[8..16].copy_from_slice(&offset.to_le_bytes());
        raw[24..32].copy_from_slice(&paddr.to_le_bytes());
        raw[32..40].copy_from_slice(&filesz.to_le_bytes());
        raw[40..48].copy_from_slice(&memsz.to_le_bytes());
        raw
    }

    #[test]
    fn iterates_by_declared_stride() {
        // Stride 64 leaves 8 trailing bytes per entry that must be skipped.
        let stride = 64;
        let mut table = alloc::vec![0u8; stride * 2];
        table[..PROGRAM_HEADER_LEN]
            .copy_from_slice(&encode_segment(1, 0x1000, 0x200, 0x20_0000, 0x200));
        table[stride..stride + PROGRAM_HEADER_LEN]
            .copy_from_slice(&encode_segment(4, 0x2000, 0x10, 0, 0x10));

        let mut headers = ProgramHeaders::new(&table, 2, stride).unwrap();
        let first = headers.next().unwrap();
        assert_eq!(first.kind, SegmentKind::Load);
        assert_eq!(first.file_offset, 0x1000);
        assert_eq!(first.file_size, 0x200);
        assert_eq!(first.phys_addr, 0x20_0000);
        assert_eq!(first.mem_size, 0x200);
        let second = headers.next().unwrap();
        assert_eq!(second.kind, SegmentKind::Note);
        assert!(headers.next().is_none());
    }

    #[test]
    fn stops_after_declared_count() {
        let table = alloc::vec![0u8; PROGRAM_HEADER_LEN * 4];
        let headers = ProgramHeaders::new(&table, 3, PROGRAM_HEADER_LEN).unwrap();
        assert_eq!(headers.count(), 3);
    }

    #[test]
    fn rejects_undersized_stride_and_short_table() {
        let table = [0u8; PROGRAM_HEADER_LEN];
        assert_eq!(
            ProgramHeaders::new(&table, 1, 40).err(),
            Some(ValidationError::BadTableStride(40))
        );
        assert_eq!(
            ProgramHeaders::new(&table, 2, PROGRAM_HEADER_LEN).err(),
            Some(ValidationError::Truncated)
        );
    }
}
