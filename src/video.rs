// ignition/src/video.rs
// Current-mode framebuffer discovery via the Graphics Output Protocol

use log::info;
use uefi::proto::console::gop::GraphicsOutput;
use uefi::table::boot::BootServices;

use crate::handoff::Framebuffer;

/// Describe the display's *current* mode. No mode enumeration or selection
/// happens here; whatever the firmware left configured is what the kernel
/// gets.
pub fn query_current_mode(boot_services: &BootServices) -> uefi::Result<Framebuffer> {
    let handle = boot_services.get_handle_for_protocol::<GraphicsOutput>()?;
    let mut gop = boot_services.open_protocol_exclusive::<GraphicsOutput>(handle)?;

    let mode = gop.current_mode_info();
    let (width, height) = mode.resolution();
    let mut raw = gop.frame_buffer();

    let framebuffer = Framebuffer {
        base: raw.as_mut_ptr(),
        size: raw.size() as u64,
        width: width as u32,
        height: height as u32,
        pixels_per_scanline: mode.stride() as u32,
    };
    info!(
        "framebuffer: {}x{} stride {} at {:p}, {} bytes",
        framebuffer.width,
        framebuffer.height,
        framebuffer.pixels_per_scanline,
        framebuffer.base,
        framebuffer.size
    );
    Ok(framebuffer)
}
