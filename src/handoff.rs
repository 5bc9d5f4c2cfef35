// ignition/src/handoff.rs
// Hand-off payload assembly and the one-shot control transfer

use core::fmt;

use crate::errors::BootError;
use crate::font::PsfFont;

/// Display framebuffer descriptor handed to the kernel.
///
/// Wire layout is fixed: consumers must address rows through
/// `pixels_per_scanline`, which may exceed `width`.
#[repr(C)]
#[derive(Debug)]
pub struct Framebuffer {
    pub base: *mut u8,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub pixels_per_scanline: u32,
}

/// The ordered argument tuple delivered to the kernel entry point.
///
/// Either pointer may be null when the backing resource was unavailable; the
/// assembler passes absence through rather than blocking the boot.
#[repr(C)]
#[derive(Debug)]
pub struct HandoffPayload {
    pub framebuffer: *mut Framebuffer,
    pub font: *mut PsfFont,
}

impl HandoffPayload {
    pub fn assemble(framebuffer: Option<&mut Framebuffer>, font: Option<&mut PsfFont>) -> Self {
        Self {
            framebuffer: framebuffer.map_or(core::ptr::null_mut(), |fb| fb as *mut Framebuffer),
            font: font.map_or(core::ptr::null_mut(), |f| f as *mut PsfFont),
        }
    }
}

/// Boot pipeline stages, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Unvalidated,
    HeaderValidated,
    SegmentsMapped,
    PayloadAssembled,
    Transferred,
}

impl Stage {
    fn successor(self) -> Option<Stage> {
        match self {
            Stage::Unvalidated => Some(Stage::HeaderValidated),
            Stage::HeaderValidated => Some(Stage::SegmentsMapped),
            Stage::SegmentsMapped => Some(Stage::PayloadAssembled),
            Stage::PayloadAssembled => Some(Stage::Transferred),
            Stage::Transferred => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unvalidated => "unvalidated",
            Stage::HeaderValidated => "header-validated",
            Stage::SegmentsMapped => "segments-mapped",
            Stage::PayloadAssembled => "payload-assembled",
            Stage::Transferred => "transferred",
        };
        f.write_str(name)
    }
}

/// Linear, forward-only state machine gating the boot pipeline.
///
/// Each stage may be entered exactly once and only from its predecessor;
/// there is no reverse transition and no re-entry once
/// [`Stage::Transferred`] is reached.
#[derive(Debug)]
pub struct BootFlow {
    stage: Stage,
}

impl BootFlow {
    pub const fn new() -> Self {
        Self { stage: Stage::Unvalidated }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), BootError> {
        if self.stage.successor() == Some(next) {
            self.stage = next;
            Ok(())
        } else {
            Err(BootError::SequenceViolation { from: self.stage, to: next })
        }
    }
}

impl Default for BootFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry-point contract: SysV x86-64 calling convention, two descriptor
/// pointers in, diagnostic integer out. The zero-argument signature used by
/// an earlier revision of this contract is superseded and not supported.
#[cfg(feature = "uefi")]
pub type KernelEntry = unsafe extern "sysv64" fn(*mut Framebuffer, *mut PsfFont) -> i32;

/// Reinterpret the validated entry address as a [`KernelEntry`] and invoke
/// it once. This is the single unsafe boundary of the pipeline.
///
/// A production kernel never returns; a returned integer is a legitimate
/// debug-only outcome and is handed back for logging.
///
/// # Safety
///
/// `entry` must be the entry address of a validated, fully mapped ELF64
/// executable whose entry point follows the [`KernelEntry`] ABI, and the
/// payload's backing storage must outlive the call.
#[cfg(feature = "uefi")]
pub unsafe fn enter_kernel(
    flow: &mut BootFlow,
    entry: u64,
    payload: &HandoffPayload,
) -> Result<i32, BootError> {
    flow.advance(Stage::Transferred)?;
    let entry: KernelEntry = core::mem::transmute(entry as usize);
    Ok(entry(payload.framebuffer, payload.font))
}
