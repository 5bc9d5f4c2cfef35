// ignition/src/font.rs
// PSF1 bitmap font: fixed header plus an opaque flat glyph table

use core::fmt;

pub const PSF1_MAGIC: [u8; 2] = [0x36, 0x04];
/// Mode bit selecting a 512-glyph table instead of the default 256.
pub const PSF1_MODE_512: u8 = 0x01;
/// Size of the fixed PSF1 header.
pub const PSF1_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontError {
    BadMagic([u8; 2]),
    Truncated,
}

impl fmt::Display for FontError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontError::BadMagic(m) => write!(f, "bad font magic {:02x?}", m),
            FontError::Truncated => write!(f, "font file shorter than its glyph table"),
        }
    }
}

/// Fixed 4-byte PSF1 header. Part of the hand-off wire format.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsfHeader {
    pub magic: [u8; 2],
    pub mode: u8,
    pub glyph_height: u8,
}

impl PsfHeader {
    pub fn parse(raw: &[u8]) -> Result<Self, FontError> {
        if raw.len() < PSF1_HEADER_LEN {
            return Err(FontError::Truncated);
        }
        let magic = [raw[0], raw[1]];
        if magic != PSF1_MAGIC {
            return Err(FontError::BadMagic(magic));
        }
        Ok(Self { magic, mode: raw[2], glyph_height: raw[3] })
    }

    pub fn glyph_count(&self) -> usize {
        if self.mode & PSF1_MODE_512 != 0 {
            512
        } else {
            256
        }
    }

    /// Byte size of the flat glyph table that follows the header.
    pub fn glyph_table_len(&self) -> usize {
        self.glyph_height as usize * self.glyph_count()
    }
}

/// Font descriptor handed to the kernel: header by value, glyph table as an
/// opaque blob the loader never interprets.
#[repr(C)]
#[derive(Debug)]
pub struct PsfFont {
    pub header: PsfHeader,
    pub glyphs: *mut u8,
}

/// Load the boot font from the volume root. A missing or malformed font is
/// non-fatal: the kernel is handed a null font pointer instead.
#[cfg(feature = "uefi")]
pub fn load(root: &mut uefi::proto::media::file::Directory, path: &uefi::CStr16) -> Option<PsfFont> {
    use alloc::boxed::Box;
    use alloc::vec;
    use log::{info, warn};
    use uefi::proto::media::file::{File, FileAttribute, FileMode};

    let handle = match root.open(path, FileMode::Read, FileAttribute::READ_ONLY) {
        Ok(handle) => handle,
        Err(_) => {
            warn!("font {} not found; kernel gets no font", path);
            return None;
        }
    };
    let mut file = match handle.into_regular_file() {
        Some(file) => file,
        None => {
            warn!("font {} is not a regular file", path);
            return None;
        }
    };

    let mut header_raw = [0u8; PSF1_HEADER_LEN];
    if read_exact(&mut file, &mut header_raw).is_err() {
        warn!("font {}: header read failed", path);
        return None;
    }
    let header = match PsfHeader::parse(&header_raw) {
        Ok(header) => header,
        Err(e) => {
            warn!("font {}: {}", path, e);
            return None;
        }
    };

    let mut table = vec![0u8; header.glyph_table_len()];
    if read_exact(&mut file, &mut table).is_err() {
        warn!("font {}: {}", path, FontError::Truncated);
        return None;
    }

    info!(
        "font {} loaded: {} glyphs, {} bytes each",
        path,
        header.glyph_count(),
        header.glyph_height
    );
    // The glyph table must stay alive for the running kernel; it is never
    // reclaimed, like every other hand-off resource.
    let glyphs = Box::leak(table.into_boxed_slice());
    Some(PsfFont { header, glyphs: glyphs.as_mut_ptr() })
}

#[cfg(feature = "uefi")]
fn read_exact(file: &mut uefi::proto::media::file::RegularFile, buf: &mut [u8]) -> Result<(), ()> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = file.read(&mut buf[filled..]).map_err(|_| ())?;
        if read == 0 {
            return Err(());
        }
        filled += read;
    }
    Ok(())
}
