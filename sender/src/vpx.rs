//! VP9 encoder shim over libvpx.
//!
//! The configuration follows the WebRTC real-time VP9 settings: one pass,
//! no lag, CBR, and automatic key frame placement disabled so that key
//! frames appear only when the engine's recovery logic forces one.

use std::os::raw::{c_int, c_uint};

use bytes::Bytes;
use env_libvpx_sys as ffi;
use log::info;
use vtransport::codec::{EncodedFrame, VideoEncoder};
use vtransport::video::RawImage;
use vtransport::{Error, Result};

fn check(err: ffi::vpx_codec_err_t, what: &str) -> Result<()> {
    if err == ffi::vpx_codec_err_t::VPX_CODEC_OK {
        Ok(())
    } else {
        Err(Error::Codec(format!("{what}: {err:?}")))
    }
}

pub struct VpxEncoder {
    ctx: ffi::vpx_codec_ctx_t,
    cfg: ffi::vpx_codec_enc_cfg_t,
}

impl VpxEncoder {
    pub fn new(width: u16, height: u16, frame_rate: u16) -> Result<Self> {
        unsafe {
            let iface = ffi::vpx_codec_vp9_cx();

            let mut cfg: ffi::vpx_codec_enc_cfg_t = std::mem::zeroed();
            check(
                ffi::vpx_codec_enc_config_default(iface, &mut cfg, 0),
                "vpx_codec_enc_config_default",
            )?;

            cfg.g_w = c_uint::from(width);
            cfg.g_h = c_uint::from(height);
            cfg.g_timebase.num = 1;
            cfg.g_timebase.den = c_int::from(frame_rate);
            cfg.g_pass = ffi::vpx_enc_pass::VPX_RC_ONE_PASS;
            cfg.g_lag_in_frames = 0;
            cfg.g_error_resilient = ffi::VPX_ERROR_RESILIENT_DEFAULT as _;
            cfg.g_threads = 4;
            cfg.rc_resize_allowed = 0;
            cfg.rc_dropframe_thresh = 0;
            cfg.rc_buf_initial_sz = 500;
            cfg.rc_buf_optimal_sz = 600;
            cfg.rc_buf_sz = 1000;
            cfg.rc_min_quantizer = 2;
            cfg.rc_max_quantizer = 52;
            cfg.rc_undershoot_pct = 50;
            cfg.rc_overshoot_pct = 50;
            // Key frames are placed by the engine's recovery logic only.
            cfg.kf_mode = ffi::vpx_kf_mode::VPX_KF_DISABLED;
            cfg.kf_max_dist = c_uint::MAX;
            cfg.kf_min_dist = 0;
            cfg.rc_end_usage = ffi::vpx_rc_mode::VPX_CBR;

            let mut ctx: ffi::vpx_codec_ctx_t = std::mem::zeroed();
            check(
                ffi::vpx_codec_enc_init_ver(
                    &mut ctx,
                    iface,
                    &cfg,
                    0,
                    ffi::VPX_ENCODER_ABI_VERSION as c_int,
                ),
                "vpx_codec_enc_init",
            )?;

            let mut encoder = Self { ctx, cfg };

            let cpu_used = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(16);
            // Motion estimation effort dominates the encoding speed.
            encoder.control(ffi::vp8e_enc_control_id::VP8E_SET_CPUUSED, cpu_used as c_int)?;
            // Skip static/low-content blocks.
            encoder.control(ffi::vp8e_enc_control_id::VP8E_SET_STATIC_THRESHOLD, 1)?;
            // Clamp key frames to 900% of the average per-frame bitrate.
            encoder.control(
                ffi::vp8e_enc_control_id::VP8E_SET_MAX_INTRA_BITRATE_PCT,
                900,
            )?;
            // Adaptive quantization per segment.
            encoder.control(ffi::vp8e_enc_control_id::VP9E_SET_AQ_MODE, 3)?;
            // 2^2 = 4 column tiles, matching g_threads.
            encoder.control(ffi::vp8e_enc_control_id::VP9E_SET_TILE_COLUMNS, 2)?;
            encoder.control(ffi::vp8e_enc_control_id::VP9E_SET_ROW_MT, 1)?;
            encoder.control(ffi::vp8e_enc_control_id::VP9E_SET_FRAME_PARALLEL_DECODING, 0)?;
            encoder.control(ffi::vp8e_enc_control_id::VP9E_SET_NOISE_SENSITIVITY, 1)?;

            info!("Initialized VP9 encoder (CPU used: {cpu_used})");
            Ok(encoder)
        }
    }

    fn control(&mut self, id: ffi::vp8e_enc_control_id, value: c_int) -> Result<()> {
        unsafe {
            check(
                ffi::vpx_codec_control_(&mut self.ctx, id as c_int, value),
                "vpx_codec_control_",
            )
        }
    }
}

impl VideoEncoder for VpxEncoder {
    fn encode(
        &mut self,
        image: &RawImage,
        frame_id: u32,
        force_keyframe: bool,
    ) -> Result<EncodedFrame> {
        unsafe {
            let mut vpx_img: ffi::vpx_image_t = std::mem::zeroed();
            let wrapped = ffi::vpx_img_wrap(
                &mut vpx_img,
                ffi::vpx_img_fmt::VPX_IMG_FMT_I420,
                c_uint::from(image.width()),
                c_uint::from(image.height()),
                1,
                image.data().as_ptr() as *mut u8,
            );
            if wrapped.is_null() {
                return Err(Error::Codec("vpx_img_wrap failed".into()));
            }

            let flags: ffi::vpx_enc_frame_flags_t = if force_keyframe {
                ffi::VPX_EFLAG_FORCE_KF as _
            } else {
                0
            };
            check(
                ffi::vpx_codec_encode(
                    &mut self.ctx,
                    &vpx_img,
                    i64::from(frame_id),
                    1,
                    flags,
                    ffi::VPX_DL_REALTIME as _,
                ),
                "failed to encode a frame",
            )?;

            let mut iter: ffi::vpx_codec_iter_t = std::ptr::null();
            let mut encoded: Option<EncodedFrame> = None;
            loop {
                let pkt = ffi::vpx_codec_get_cx_data(&mut self.ctx, &mut iter);
                if pkt.is_null() {
                    break;
                }
                if (*pkt).kind != ffi::vpx_codec_cx_pkt_kind::VPX_CODEC_CX_FRAME_PKT {
                    continue;
                }
                // There should be exactly one frame encoded per call.
                if encoded.is_some() {
                    return Err(Error::MultipleFramesEncoded);
                }

                let frame = &(*pkt).data.frame;
                let data = std::slice::from_raw_parts(frame.buf as *const u8, frame.sz as usize);
                encoded = Some(EncodedFrame {
                    data: Bytes::copy_from_slice(data),
                    is_key: frame.flags & ffi::VPX_FRAME_IS_KEY != 0,
                });
            }

            encoded.ok_or_else(|| Error::Codec("encoder produced no frame packet".into()))
        }
    }

    fn set_target_bitrate(&mut self, bitrate_kbps: u32) -> Result<()> {
        self.cfg.rc_target_bitrate = bitrate_kbps;
        unsafe {
            check(
                ffi::vpx_codec_enc_config_set(&mut self.ctx, &self.cfg),
                "set_target_bitrate",
            )
        }
    }
}

impl Drop for VpxEncoder {
    fn drop(&mut self) {
        unsafe {
            if ffi::vpx_codec_destroy(&mut self.ctx) != ffi::vpx_codec_err_t::VPX_CODEC_OK {
                log::error!("failed to destroy VPX encoder context");
            }
        }
    }
}
