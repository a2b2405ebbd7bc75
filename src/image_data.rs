//! Tight packing of image texel data into a linear buffer
//! (`write_image_data_to_buffer_tight`) - used for uploads where the
//! caller already has tightly-packed rows and just needs them written out
//! in the backend's expected byte order.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io;

/// Writes `width * height` RGBA8 texels from `texels` into `out`, tightly
/// packed (no row padding). `texels` is one `u32` per pixel in `0xAABBGGRR`
/// host order; written out as four little-endian bytes per the backend's
/// expected memory layout.
pub fn write_rgba8_tight(out: &mut dyn io::Write, texels: &[u32]) -> io::Result<()> {
    for &texel in texels {
        out.write_u32::<LittleEndian>(texel)?;
    }
    Ok(())
}

/// Writes `width * height` single-channel f32 texels tightly packed.
pub fn write_r32f_tight(out: &mut dyn io::Write, texels: &[f32]) -> io::Result<()> {
    for &texel in texels {
        out.write_f32::<LittleEndian>(texel)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_round_trips_through_a_byte_buffer() {
        let texels = [0x11223344u32, 0xaabbccdd];
        let mut buf = Vec::new();
        write_rgba8_tight(&mut buf, &texels).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[0..4], &0x11223344u32.to_le_bytes());
    }
}
