// ignition/src/loader.rs
// Segment mapping: page-granular fixed-address placement of loadable segments

use alloc::vec;
use core::fmt;

use log::{debug, info};

use crate::elf::{ImageHeader, ProgramHeaders, SegmentDescriptor, SegmentKind, HEADER_LEN};
use crate::errors::BootError;
use crate::handoff::{BootFlow, Stage};

pub const PAGE_SIZE: usize = 4096;

/// Upper bound on the program header table before its declared size is
/// trusted for allocation. 64 KiB covers over a thousand entries; anything
/// larger is a corrupt or hostile image.
pub const MAX_PROGRAM_HEADER_TABLE: usize = 64 * 1024;
/// Upper bound on a single segment's in-memory size.
pub const MAX_SEGMENT_MEM: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// Fixed-address allocation refused. There is no fallback address.
    AllocationFailed { addr: u64, pages: usize },
    /// A read returned fewer bytes than the image declared.
    ShortRead,
    ReadFailed,
    SeekFailed,
    /// Declared table size is zero or exceeds [`MAX_PROGRAM_HEADER_TABLE`].
    TableSizeUnreasonable(usize),
    /// Declared in-memory size exceeds [`MAX_SEGMENT_MEM`].
    SegmentOversized(u64),
    /// A segment declares more file bytes than memory bytes.
    SizeMismatch { file_size: u64, mem_size: u64 },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::AllocationFailed { addr, pages } => {
                write!(f, "{} pages at {:#x} refused by firmware", pages, addr)
            }
            LoadError::ShortRead => write!(f, "image ended before the declared byte count"),
            LoadError::ReadFailed => write!(f, "image read failed"),
            LoadError::SeekFailed => write!(f, "image seek failed"),
            LoadError::TableSizeUnreasonable(len) => {
                write!(f, "program header table size {} is unreasonable", len)
            }
            LoadError::SegmentOversized(size) => {
                write!(f, "segment memory size {:#x} exceeds the sanity cap", size)
            }
            LoadError::SizeMismatch { file_size, mem_size } => {
                write!(f, "file size {:#x} exceeds memory size {:#x}", file_size, mem_size)
            }
        }
    }
}

/// Byte-addressable view of the kernel image, supplied by the hosting
/// firmware's file services.
pub trait ImageSource {
    fn seek(&mut self, offset: u64) -> Result<(), LoadError>;
    /// Fill `buf` completely. A premature end of data is an error; this
    /// pipeline never tolerates short reads.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LoadError>;
}

/// Page allocator owned by the hosting firmware. Only the fixed-address
/// variant is used for segments; failure is final.
pub trait SegmentMemory {
    fn allocate_at(&mut self, phys_addr: u64, pages: usize) -> Result<&'static mut [u8], LoadError>;
}

/// `ceil(bytes / PAGE_SIZE)`.
pub fn pages_for(bytes: u64) -> usize {
    ((bytes + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64) as usize
}

/// Outcome of a successful image load, everything the hand-off needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedKernel {
    pub entry: u64,
    pub segments_mapped: usize,
}

/// Materialize every loadable segment at its mandated physical address.
///
/// Non-loadable entries are inert and skipped. For each loadable entry the
/// region is page-rounded, filled from the file window, and zero-filled from
/// `file_size` to the end of the region (the BSS tail).
pub fn map_segments<S, M>(
    source: &mut S,
    memory: &mut M,
    segments: ProgramHeaders<'_>,
) -> Result<usize, LoadError>
where
    S: ImageSource,
    M: SegmentMemory,
{
    let mut mapped = 0;
    for segment in segments {
        if segment.kind != SegmentKind::Load {
            debug!("skipping inert {:?} segment", segment.kind);
            continue;
        }
        map_one(source, memory, &segment)?;
        mapped += 1;
    }
    Ok(mapped)
}

fn map_one<S, M>(source: &mut S, memory: &mut M, segment: &SegmentDescriptor) -> Result<(), LoadError>
where
    S: ImageSource,
    M: SegmentMemory,
{
    if segment.mem_size > MAX_SEGMENT_MEM {
        return Err(LoadError::SegmentOversized(segment.mem_size));
    }
    if segment.file_size > segment.mem_size {
        return Err(LoadError::SizeMismatch {
            file_size: segment.file_size,
            mem_size: segment.mem_size,
        });
    }

    let pages = pages_for(segment.mem_size);
    let region = memory.allocate_at(segment.phys_addr, pages)?;

    source.seek(segment.file_offset)?;
    let copied = segment.file_size as usize;
    source.read_exact(&mut region[..copied])?;
    region[copied..].fill(0);

    debug!(
        "segment mapped: {} pages at {:#x}, {:#x} bytes from offset {:#x}",
        pages, segment.phys_addr, segment.file_size, segment.file_offset
    );
    Ok(())
}

/// The full image pipeline: header validation, then segment mapping, each a
/// hard gate advancing `flow`. Returns the entry address for the hand-off.
pub fn load_image<S, M>(
    source: &mut S,
    memory: &mut M,
    flow: &mut BootFlow,
) -> Result<LoadedKernel, BootError>
where
    S: ImageSource,
    M: SegmentMemory,
{
    let mut header_raw = [0u8; HEADER_LEN];
    source.seek(0)?;
    source.read_exact(&mut header_raw)?;
    let header = ImageHeader::parse(&header_raw)?;
    header.validate()?;
    flow.advance(Stage::HeaderValidated)?;
    info!(
        "kernel header validated: entry {:#x}, {} program headers",
        header.entry, header.ph_count
    );

    let table_len = header.ph_count as usize * header.ph_entry_size as usize;
    if table_len == 0 || table_len > MAX_PROGRAM_HEADER_TABLE {
        return Err(LoadError::TableSizeUnreasonable(table_len).into());
    }
    let mut table = vec![0u8; table_len];
    source.seek(header.ph_offset)?;
    source.read_exact(&mut table)?;

    let segments = ProgramHeaders::new(&table, header.ph_count as usize, header.ph_entry_size as usize)
        .map_err(BootError::ImageInvalid)?;
    let segments_mapped = map_segments(source, memory, segments)?;
    flow.advance(Stage::SegmentsMapped)?;
    info!("{} loadable segments mapped", segments_mapped);

    Ok(LoadedKernel { entry: header.entry, segments_mapped })
}

/// [`ImageSource`] over a UEFI regular file. Short reads from the firmware
/// are surfaced as [`LoadError::ShortRead`] rather than silently accepted.
#[cfg(feature = "uefi")]
pub struct UefiImageSource<'a> {
    file: &'a mut uefi::proto::media::file::RegularFile,
}

#[cfg(feature = "uefi")]
impl<'a> UefiImageSource<'a> {
    pub fn new(file: &'a mut uefi::proto::media::file::RegularFile) -> Self {
        Self { file }
    }
}

#[cfg(feature = "uefi")]
impl ImageSource for UefiImageSource<'_> {
    fn seek(&mut self, offset: u64) -> Result<(), LoadError> {
        self.file.set_position(offset).map_err(|_| LoadError::SeekFailed)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LoadError> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.file.read(&mut buf[filled..]).map_err(|_| LoadError::ReadFailed)?;
            if read == 0 {
                return Err(LoadError::ShortRead);
            }
            filled += read;
        }
        Ok(())
    }
}

/// [`SegmentMemory`] over UEFI boot services. Regions are never freed; the
/// running kernel owns them from allocation onward.
#[cfg(feature = "uefi")]
pub struct UefiSegmentMemory<'a> {
    boot_services: &'a uefi::table::boot::BootServices,
}

#[cfg(feature = "uefi")]
impl<'a> UefiSegmentMemory<'a> {
    pub fn new(boot_services: &'a uefi::table::boot::BootServices) -> Self {
        Self { boot_services }
    }
}

#[cfg(feature = "uefi")]
impl SegmentMemory for UefiSegmentMemory<'_> {
    fn allocate_at(&mut self, phys_addr: u64, pages: usize) -> Result<&'static mut [u8], LoadError> {
        use uefi::table::boot::{AllocateType, MemoryType};

        let addr = self
            .boot_services
            .allocate_pages(AllocateType::Address(phys_addr), MemoryType::LOADER_DATA, pages)
            .map_err(|_| LoadError::AllocationFailed { addr: phys_addr, pages })?;
        // Exclusively ours from here on; the firmware hands back the exact
        // address we demanded.
        Ok(unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, pages * PAGE_SIZE) })
    }
}
