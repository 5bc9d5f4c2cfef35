// ignition/src/main.rs
// UEFI entry point: the load-validate-map-handoff pipeline
#![no_std]
#![no_main]

extern crate alloc;

use log::{error, info, warn};
use uefi::prelude::*;
use uefi::proto::media::file::{Directory, File, FileAttribute, FileInfo, FileMode, RegularFile};
use uefi::table::boot::BootServices;
use uefi::{cstr16, CStr16};

use ignition::elf::{ValidationError, HEADER_LEN};
use ignition::errors::BootError;
use ignition::handoff::{self, BootFlow, HandoffPayload, Stage};
use ignition::loader::{self, LoadedKernel, UefiImageSource, UefiSegmentMemory};
use ignition::{font, video};

const KERNEL_PATH: &CStr16 = cstr16!("kernel.elf");
const FONT_PATH: &CStr16 = cstr16!("zap-light16.psf");

#[entry]
fn efi_main(image: Handle, mut system_table: SystemTable<Boot>) -> Status {
    uefi_services::init(&mut system_table).unwrap();
    let boot_services = system_table.boot_services();
    let mut flow = BootFlow::new();

    info!("ignition: scanning boot volume for {}", KERNEL_PATH);

    let mut root = match open_boot_volume(boot_services, image) {
        Ok(root) => root,
        Err(status) => {
            error!("boot volume inaccessible");
            return status;
        }
    };

    let kernel = match load_kernel(boot_services, &mut root, &mut flow) {
        Ok(kernel) => kernel,
        Err(e) => {
            error!("boot aborted: {}", e);
            return Status::LOAD_ERROR;
        }
    };

    // Display and font are best-effort: absence degrades to a null pointer
    // in the payload, never to an aborted boot.
    let mut framebuffer = match video::query_current_mode(boot_services) {
        Ok(framebuffer) => Some(framebuffer),
        Err(_) => {
            warn!("display mode unavailable; kernel gets no framebuffer");
            None
        }
    };
    let mut psf = font::load(&mut root, FONT_PATH);

    let payload = HandoffPayload::assemble(framebuffer.as_mut(), psf.as_mut());
    if let Err(e) = flow.advance(Stage::PayloadAssembled) {
        error!("boot aborted: {}", e);
        return Status::LOAD_ERROR;
    }

    info!("transferring control to kernel entry {:#x}", kernel.entry);
    match unsafe { handoff::enter_kernel(&mut flow, kernel.entry, &payload) } {
        Ok(code) => {
            // Only a debug kernel comes back here.
            info!("kernel returned {}", code);
            Status::SUCCESS
        }
        Err(e) => {
            error!("boot aborted: {}", e);
            Status::LOAD_ERROR
        }
    }
}

fn open_boot_volume(boot_services: &BootServices, image: Handle) -> Result<Directory, Status> {
    let mut fs = boot_services
        .get_image_file_system(image)
        .map_err(|e| e.status())?;
    fs.open_volume().map_err(|e| e.status())
}

fn load_kernel(
    boot_services: &BootServices,
    root: &mut Directory,
    flow: &mut BootFlow,
) -> Result<LoadedKernel, BootError> {
    let mut file = open_kernel_image(root)?;

    // Stat before trusting the image: anything shorter than the fixed
    // header cannot be a kernel.
    let stat = file
        .get_boxed_info::<FileInfo>()
        .map_err(|_| BootError::KernelMissing)?;
    if stat.file_size() < HEADER_LEN as u64 {
        return Err(BootError::ImageInvalid(ValidationError::Truncated));
    }
    info!("{} found, {} bytes", KERNEL_PATH, stat.file_size());

    let mut source = UefiImageSource::new(&mut file);
    let mut memory = UefiSegmentMemory::new(boot_services);
    loader::load_image(&mut source, &mut memory, flow)
}

fn open_kernel_image(root: &mut Directory) -> Result<RegularFile, BootError> {
    let handle = root
        .open(KERNEL_PATH, FileMode::Read, FileAttribute::READ_ONLY)
        .map_err(|_| BootError::KernelMissing)?;
    handle.into_regular_file().ok_or(BootError::KernelMissing)
}
