//! Backprojection: map every sample through the lookup table.

use crate::color::DeviceHsl;
use crate::device::{BufferAccess, ComputeDevice, KernelArg, NdRange};
use crate::error::Result;
use crate::histogram::check_pixel_count;
use crate::kernels::KernelName;
use crate::normalise::LookupTable;
use crate::report::{Stage, StageTiming, Staged};

/// Remap one channel through `lut` on the device.
pub fn backproject<D: ComputeDevice>(
    device: &D,
    channel: &[u16],
    lut: &LookupTable,
) -> Result<Staged<Vec<u16>>> {
    let pixels = device.upload(channel, BufferAccess::ReadOnly)?;
    let table = device.upload(lut.entries(), BufferAccess::ReadOnly)?;
    let output = device.create_buffer::<u16>(channel.len(), BufferAccess::WriteOnly)?;

    let event = device.enqueue_kernel(
        KernelName::Backprojection,
        NdRange::new(channel.len()),
        &[
            pixels.arg(),
            table.arg(),
            output.arg(),
            KernelArg::Uint(lut.bin_size()),
        ],
    )?;
    let samples = device.download(&output, channel.len())?;

    Ok(Staged::new(
        samples,
        vec![StageTiming::from_event(Stage::Backproject, &event)],
    ))
}

/// Replace the lightness plane of a device HSL image with its remapped level.
pub fn backproject_lightness<D: ComputeDevice>(
    device: &D,
    hsl: &DeviceHsl,
    lut: &LookupTable,
) -> Result<Staged<()>> {
    let pixel_count = check_pixel_count(hsl.pixel_count())?;
    let table = device.upload(lut.entries(), BufferAccess::ReadOnly)?;

    let event = device.enqueue_kernel(
        KernelName::BackprojectionHsl,
        NdRange::new(hsl.pixel_count()),
        &[
            hsl.buffer().arg(),
            table.arg(),
            KernelArg::Uint(lut.bin_size()),
            KernelArg::Uint(lut.max_value() as u32),
            KernelArg::Uint(pixel_count),
        ],
    )?;

    Ok(Staged::new(
        (),
        vec![StageTiming::from_event(Stage::Backproject, &event)],
    ))
}
