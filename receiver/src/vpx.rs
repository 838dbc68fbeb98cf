//! VP9 decoder shim over libvpx.

use std::os::raw::{c_int, c_uint};

use env_libvpx_sys as ffi;
use log::info;
use vtransport::codec::VideoDecoder;
use vtransport::video::RawImage;
use vtransport::{Error, Result};

fn check(err: ffi::vpx_codec_err_t, what: &str) -> Result<()> {
    if err == ffi::vpx_codec_err_t::VPX_CODEC_OK {
        Ok(())
    } else {
        Err(Error::Codec(format!("{what}: {err:?}")))
    }
}

pub struct VpxDecoder {
    ctx: ffi::vpx_codec_ctx_t,
    width: u16,
    height: u16,
}

impl VpxDecoder {
    pub fn new(width: u16, height: u16) -> Result<Self> {
        let max_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(4);

        unsafe {
            let cfg = ffi::vpx_codec_dec_cfg_t {
                threads: max_threads as c_uint,
                w: c_uint::from(width),
                h: c_uint::from(height),
            };
            let mut ctx: ffi::vpx_codec_ctx_t = std::mem::zeroed();
            check(
                ffi::vpx_codec_dec_init_ver(
                    &mut ctx,
                    ffi::vpx_codec_vp9_dx(),
                    &cfg,
                    0,
                    ffi::VPX_DECODER_ABI_VERSION as c_int,
                ),
                "vpx_codec_dec_init",
            )?;

            info!("Initialized VP9 decoder (max threads: {max_threads})");
            Ok(Self { ctx, width, height })
        }
    }
}

impl VideoDecoder for VpxDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Option<RawImage>> {
        unsafe {
            check(
                ffi::vpx_codec_decode(
                    &mut self.ctx,
                    data.as_ptr(),
                    data.len() as c_uint,
                    std::ptr::null_mut(),
                    1,
                ),
                "failed to decode a frame",
            )?;

            let mut iter: ffi::vpx_codec_iter_t = std::ptr::null();
            let mut decoded: Option<RawImage> = None;
            loop {
                let img = ffi::vpx_codec_get_frame(&mut self.ctx, &mut iter);
                if img.is_null() {
                    break;
                }
                // There should be exactly one frame decoded per call.
                if decoded.is_some() {
                    return Err(Error::MultipleFramesDecoded);
                }
                decoded = Some(copy_image(&*img, self.width, self.height));
            }
            Ok(decoded)
        }
    }
}

impl Drop for VpxDecoder {
    fn drop(&mut self) {
        unsafe {
            if ffi::vpx_codec_destroy(&mut self.ctx) != ffi::vpx_codec_err_t::VPX_CODEC_OK {
                log::error!("failed to destroy VPX decoder context");
            }
        }
    }
}

/// Copies a stride-padded decoded picture into a tightly packed image.
unsafe fn copy_image(img: &ffi::vpx_image_t, width: u16, height: u16) -> RawImage {
    let mut out = RawImage::new(width, height);
    let (luma_w, luma_h) = (usize::from(width), usize::from(height));
    let (chroma_w, chroma_h) = (out.chroma_width(), out.chroma_height());

    unsafe {
        copy_plane(img.planes[0], img.stride[0], out.y_mut(), luma_w, luma_h);
        copy_plane(img.planes[1], img.stride[1], out.u_mut(), chroma_w, chroma_h);
        copy_plane(img.planes[2], img.stride[2], out.v_mut(), chroma_w, chroma_h);
    }
    out
}

unsafe fn copy_plane(src: *const u8, stride: c_int, dst: &mut [u8], width: usize, rows: usize) {
    for row in 0..rows {
        let src_row =
            unsafe { std::slice::from_raw_parts(src.add(row * stride as usize), width) };
        dst[row * width..(row + 1) * width].copy_from_slice(src_row);
    }
}
