// ignition/src/lib.rs
//! UEFI bootloader core: validate an ELF64 kernel image, map its loadable
//! segments at their mandated physical addresses, and hand off a framebuffer
//! and bitmap font to the kernel entry point.
//!
//! Everything except the firmware collaborators is plain no_std code; the
//! UEFI surface (file access, page allocation, display query, the actual
//! control transfer) sits behind the `uefi` feature so the core builds and
//! tests on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod elf;
pub mod errors;
pub mod font;
pub mod handoff;
pub mod loader;
#[cfg(feature = "uefi")]
pub mod video;
