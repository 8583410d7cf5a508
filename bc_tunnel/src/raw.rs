//! Raw `extern "C"` declarations mirroring `bambu_tunnel.h` bit-for-bit.
//! Nothing in this module is safe to call outside of [`crate::Tunnel`];
//! it exists only to give the vendor ABI a name in Rust.
#![allow(non_camel_case_types, dead_code)]

use std::os::raw::{c_char, c_int, c_uchar, c_ulong, c_void};

pub type Bambu_Tunnel = *mut c_void;

pub type Logger = extern "C" fn(context: *mut c_void, level: c_int, msg: *const c_char);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bambu_StreamType {
    VIDE = 0,
    AUDI = 1,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bambu_Error {
    Bambu_success = 0,
    Bambu_stream_end = 1,
    Bambu_would_block = 2,
    Bambu_buffer_limit = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VideoFormat {
    pub width: c_int,
    pub height: c_int,
    pub frame_rate: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AudioFormat {
    pub sample_rate: c_int,
    pub channel_count: c_int,
    pub sample_size: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union StreamFormat {
    pub video: VideoFormat,
    pub audio: AudioFormat,
}

#[repr(C)]
pub struct Bambu_StreamInfo {
    pub r#type: Bambu_StreamType,
    pub sub_type: c_int,
    pub format: StreamFormat,
    pub format_type: c_int,
    pub format_size: c_int,
    pub max_frame_size: c_int,
    pub format_buffer: *const c_uchar,
}

#[repr(C)]
pub struct Bambu_Sample {
    pub itrack: c_int,
    pub size: c_int,
    pub flags: c_int,
    pub buffer: *const c_uchar,
    pub decode_time: u64,
}

extern "C" {
    pub fn Bambu_Create(tunnel: *mut Bambu_Tunnel, path: *const c_char) -> c_int;
    pub fn Bambu_SetLogger(tunnel: Bambu_Tunnel, logger: Logger, context: *mut c_void);
    pub fn Bambu_Open(tunnel: Bambu_Tunnel) -> c_int;
    pub fn Bambu_StartStream(tunnel: Bambu_Tunnel, video: c_int) -> c_int;
    pub fn Bambu_GetStreamCount(tunnel: Bambu_Tunnel) -> c_int;
    pub fn Bambu_GetStreamInfo(
        tunnel: Bambu_Tunnel,
        index: c_int,
        info: *mut Bambu_StreamInfo,
    ) -> c_int;
    pub fn Bambu_ReadSample(tunnel: Bambu_Tunnel, sample: *mut Bambu_Sample) -> c_int;
    pub fn Bambu_Close(tunnel: Bambu_Tunnel);
    pub fn Bambu_Destroy(tunnel: Bambu_Tunnel);
    pub fn Bambu_GetLastErrorMsg() -> *const c_char;
    pub fn Bambu_FreeLogMsg(msg: *const c_char);
    #[allow(dead_code)]
    pub fn Bambu_Init() -> c_int;
    #[allow(dead_code)]
    pub fn Bambu_Deinit();
    #[allow(dead_code)]
    pub fn Bambu_GetDuration(tunnel: Bambu_Tunnel) -> c_ulong;
    #[allow(dead_code)]
    pub fn Bambu_Seek(tunnel: Bambu_Tunnel, time: c_ulong) -> c_int;
}
