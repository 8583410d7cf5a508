//! Safe wrapper around the vendor `Bambu_Tunnel` C API ([`raw`]). This
//! crate only binds the FFI boundary: connection retry policy, stream
//! validation, and frame ownership semantics live one layer up in
//! `bc_source`, which is the thing that actually implements the Frame
//! Source contract.

pub mod raw;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

/// Mirrors `Bambu_Error`, minus the success case which is folded into `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelError {
    StreamEnd,
    WouldBlock,
    BufferLimit,
    /// Any other nonzero return code from the vendor library.
    Failed(i32),
}

fn check(res: c_int) -> Result<(), TunnelError> {
    match res {
        0 => Ok(()),
        1 => Err(TunnelError::StreamEnd),
        2 => Err(TunnelError::WouldBlock),
        3 => Err(TunnelError::BufferLimit),
        other => Err(TunnelError::Failed(other)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub stream_type: StreamType,
    pub width: i32,
    pub height: i32,
    pub frame_rate: i32,
    pub max_frame_size: i32,
}

/// A single undecoded sample read from the tunnel. The buffer is
/// borrowed from the tunnel and is only valid until the next call to
/// [`Tunnel::read_sample`].
pub struct Sample<'a> {
    pub bytes: &'a [u8],
}

/// Owns one connection to the printer's vendor tunnel.
pub struct Tunnel {
    handle: raw::Bambu_Tunnel,
}

// The vendor library serializes access internally per tunnel handle and
// documents no thread-affinity requirement beyond "one thread at a time."
unsafe impl Send for Tunnel {}

extern "C" fn log_trampoline(_context: *mut c_void, level: c_int, msg: *const c_char) {
    if !msg.is_null() {
        let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy();
        tracing::debug!(target: "bambu_tunnel", level, message = %text, "vendor tunnel log");
    }
    unsafe { raw::Bambu_FreeLogMsg(msg) };
}

impl Tunnel {
    /// Creates the tunnel against the given `bambu:///...` URL and
    /// installs a logger that forwards vendor diagnostics through
    /// `tracing`.
    pub fn create(url: &str) -> Result<Self, TunnelError> {
        let c_url = CString::new(url).map_err(|_| TunnelError::Failed(-1))?;
        let mut handle: raw::Bambu_Tunnel = ptr::null_mut();
        check(unsafe { raw::Bambu_Create(&mut handle, c_url.as_ptr()) })?;
        unsafe { raw::Bambu_SetLogger(handle, log_trampoline, ptr::null_mut()) };
        Ok(Self { handle })
    }

    pub fn open(&self) -> Result<(), TunnelError> {
        check(unsafe { raw::Bambu_Open(self.handle) })
    }

    /// One attempt at starting the video sub-stream. Returns
    /// `Err(TunnelError::WouldBlock)` if the caller should retry after a
    /// short delay; the retry loop itself lives in `bc_source`.
    pub fn start_video_stream(&self) -> Result<(), TunnelError> {
        check(unsafe { raw::Bambu_StartStream(self.handle, 1) })
    }

    pub fn stream_count(&self) -> i32 {
        unsafe { raw::Bambu_GetStreamCount(self.handle) }
    }

    pub fn stream_info(&self, index: i32) -> Result<StreamInfo, TunnelError> {
        let mut info = raw::Bambu_StreamInfo {
            r#type: raw::Bambu_StreamType::VIDE,
            sub_type: 0,
            format: raw::StreamFormat {
                video: raw::VideoFormat {
                    width: 0,
                    height: 0,
                    frame_rate: 0,
                },
            },
            format_type: 0,
            format_size: 0,
            max_frame_size: 0,
            format_buffer: ptr::null(),
        };
        check(unsafe { raw::Bambu_GetStreamInfo(self.handle, index, &mut info) })?;

        let stream_type = match info.r#type {
            raw::Bambu_StreamType::VIDE => StreamType::Video,
            raw::Bambu_StreamType::AUDI => StreamType::Audio,
        };
        let video = unsafe { info.format.video };
        Ok(StreamInfo {
            stream_type,
            width: video.width,
            height: video.height,
            frame_rate: video.frame_rate,
            max_frame_size: info.max_frame_size,
        })
    }

    /// One attempt at reading the next sample. Returns
    /// `Err(TunnelError::WouldBlock)` if the caller should retry.
    pub fn read_sample(&self) -> Result<Sample<'_>, TunnelError> {
        let mut sample = raw::Bambu_Sample {
            itrack: 0,
            size: 0,
            flags: 0,
            buffer: ptr::null(),
            decode_time: 0,
        };
        check(unsafe { raw::Bambu_ReadSample(self.handle, &mut sample) })?;

        if sample.buffer.is_null() || sample.size < 0 {
            return Err(TunnelError::Failed(-1));
        }
        let bytes = unsafe { std::slice::from_raw_parts(sample.buffer, sample.size as usize) };
        Ok(Sample { bytes })
    }

    pub fn close(&self) {
        unsafe { raw::Bambu_Close(self.handle) };
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        unsafe {
            raw::Bambu_Close(self.handle);
            raw::Bambu_Destroy(self.handle);
        }
    }
}
