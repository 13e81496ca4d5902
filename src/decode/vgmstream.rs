//! Dynamic binding to `libvgmstream` API v1.
//!
//! The library is loaded at runtime with [`libloading`]; nothing links against it at build
//! time. A sound bank is handed to the library through an in-memory streamfile, so no
//! temporary files are written.

use super::{
    discover::{self, LIBRARY_NAME},
    error::{DecodeError, DecodeErrorKind},
    Engine, EngineStream, Rendered, SampleFormat, StreamConfig, StreamFormat,
};
use libloading::Library;
use log::debug;
use std::{
    ffi::{c_char, c_int, c_void, CStr, CString},
    marker::PhantomData,
    num::NonZeroU32,
    path::PathBuf,
    ptr::{self, NonNull},
    slice,
};

const SFMT_PCM16: c_int = 1;
const LOG_LEVEL_NONE: c_int = 100;

const MEMORY_FILE_NAME: &CStr = c"memory.fsb";

#[repr(C)]
#[derive(Debug)]
struct StreamFile {
    user_data: *mut c_void,
    read: Option<unsafe extern "C" fn(*mut c_void, *mut u8, i64, c_int) -> c_int>,
    get_size: Option<unsafe extern "C" fn(*mut c_void) -> i64>,
    get_name: Option<unsafe extern "C" fn(*mut c_void) -> *const c_char>,
    open: Option<unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut StreamFile>,
    close: Option<unsafe extern "C" fn(*mut StreamFile)>,
}

#[repr(C)]
#[derive(Debug, Default)]
struct Config {
    disable_config_override: bool,
    allow_play_forever: bool,
    play_forever: bool,
    ignore_loop: bool,
    force_loop: bool,
    really_force_loop: bool,
    ignore_fade: bool,
    loop_count: f64,
    fade_time: f64,
    fade_delay: f64,
    stereo_track: c_int,
    auto_downmix_channels: c_int,
    force_sfmt: c_int,
}

impl From<&StreamConfig> for Config {
    fn from(config: &StreamConfig) -> Self {
        Self {
            ignore_loop: config.ignore_loop,
            ignore_fade: config.ignore_fade,
            loop_count: config.loop_count,
            force_sfmt: if config.force_pcm16 { SFMT_PCM16 } else { 0 },
            ..Self::default()
        }
    }
}

// mirrors the C layout; only some fields are read
#[allow(dead_code)]
#[repr(C)]
#[derive(Debug)]
struct Format {
    sample_rate: c_int,
    channels: c_int,
    channel_layout: u32,
    subsong_index: c_int,
    subsong_count: c_int,
    input_channels: c_int,
    sample_format: c_int,
    sample_size: c_int,
    stream_samples: i64,
    loop_start: i64,
    loop_end: i64,
    loop_flag: bool,
    play_forever: bool,
    play_samples: i64,
    stream_bitrate: c_int,
    codec_name: [c_char; 128],
    layout_name: [c_char; 128],
    meta_name: [c_char; 128],
    stream_name: [c_char; 256],
    format_id: c_int,
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Debug)]
struct DecoderState {
    buf: *mut c_void,
    buf_samples: c_int,
    buf_bytes: c_int,
    done: bool,
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Debug)]
struct Lib {
    private: *mut c_void,
    format: *const Format,
    decoder: *mut DecoderState,
}

type GetVersionFn = unsafe extern "C" fn() -> u32;
type InitFn = unsafe extern "C" fn() -> *mut Lib;
type FreeFn = unsafe extern "C" fn(*mut Lib);
type SetupFn = unsafe extern "C" fn(*mut Lib, *mut Config);
type OpenStreamFn = unsafe extern "C" fn(*mut Lib, *mut StreamFile, c_int) -> c_int;
type CloseStreamFn = unsafe extern "C" fn(*mut Lib);
type RenderFn = unsafe extern "C" fn(*mut Lib) -> c_int;
type LogCallback = unsafe extern "C" fn(c_int, *const c_char);
type SetLogFn = unsafe extern "C" fn(c_int, Option<LogCallback>);

/// A loaded `libvgmstream` with every export the decoder calls.
#[derive(Debug)]
pub(crate) struct Vgmstream {
    get_version: GetVersionFn,
    init: InitFn,
    free: FreeFn,
    setup: SetupFn,
    open_stream: OpenStreamFn,
    close_stream: CloseStreamFn,
    render: RenderFn,
    // the function pointers above are only valid while this is loaded
    library: Library,
}

impl Vgmstream {
    /// Finds and loads the library, resolving its exports.
    pub(crate) fn load() -> Result<Self, DecodeError> {
        let path = discover::locate().unwrap_or_else(|| PathBuf::from(LIBRARY_NAME));
        debug!("loading decoder library from {}", path.display());

        // SAFETY: loading libvgmstream runs no initializers with preconditions on the caller
        let library = unsafe { Library::new(&path) }
            .map_err(DecodeError::library(DecodeErrorKind::LoadLibrary))?;

        // SAFETY: each type alias matches the C declaration of the export it is resolved from
        let vgmstream = unsafe {
            Self {
                get_version: symbol(&library, "libvgmstream_get_version\0")?,
                init: symbol(&library, "libvgmstream_init\0")?,
                free: symbol(&library, "libvgmstream_free\0")?,
                setup: symbol(&library, "libvgmstream_setup\0")?,
                open_stream: symbol(&library, "libvgmstream_open_stream\0")?,
                close_stream: symbol(&library, "libvgmstream_close_stream\0")?,
                render: symbol(&library, "libvgmstream_render\0")?,
                library,
            }
        };

        // SAFETY: as above
        let set_log = unsafe { symbol::<SetLogFn>(&vgmstream.library, "libvgmstream_set_log\0") };
        if let Ok(set_log) = set_log {
            // SAFETY: a null callback with the NONE level silences the library's own logging
            unsafe { set_log(LOG_LEVEL_NONE, None) };
        }

        Ok(vgmstream)
    }
}

/// Resolves an export and copies the function pointer out of the library.
///
/// # Safety
/// `T` must be the function pointer type of the export named `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T, DecodeError> {
    // SAFETY: upheld by the caller
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|symbol| *symbol)
        .map_err(DecodeError::library(DecodeErrorKind::MissingExport {
            symbol: name.trim_end_matches('\0'),
        }))
}

impl Engine for Vgmstream {
    fn version(&self) -> u32 {
        // SAFETY: the export takes no arguments
        unsafe { (self.get_version)() }
    }

    fn open<'a>(
        &'a self,
        bank: &'a [u8],
        subsong: NonZeroU32,
        config: &StreamConfig,
    ) -> Result<Box<dyn EngineStream + 'a>, DecodeError> {
        let open_failed = || DecodeError::new(DecodeErrorKind::Open { subsong });

        let index = c_int::try_from(subsong.get()).map_err(|_| open_failed())?;
        if bank.is_empty() {
            return Err(open_failed());
        }

        let file = MemoryFile::create(bank.as_ptr(), bank.len(), MEMORY_FILE_NAME.to_owned());

        // SAFETY: the export takes no arguments
        let Some(lib) = NonNull::new(unsafe { (self.init)() }) else {
            // SAFETY: `file` came from `MemoryFile::create` and has not been handed out
            unsafe { close_file(file) };
            return Err(DecodeError::new(DecodeErrorKind::Init));
        };

        let stream = VgmstreamStream {
            vgmstream: self,
            lib,
            file,
            _bank: PhantomData,
        };

        let mut raw_config = Config::from(config);
        // SAFETY: `lib` is live and the library copies the config before returning
        unsafe { (self.setup)(lib.as_ptr(), &mut raw_config) };

        // SAFETY: `file` reads from `bank`, which outlives the returned stream
        let rc = unsafe { (self.open_stream)(lib.as_ptr(), file, index) };

        // SAFETY: `lib` is live
        let opened = unsafe { lib.as_ref() };
        if rc < 0 || opened.format.is_null() || opened.decoder.is_null() {
            return Err(open_failed());
        }

        Ok(Box::new(stream))
    }
}

/// One open subsong. Owns the library instance and the streamfile wrapping the bank.
struct VgmstreamStream<'a> {
    vgmstream: &'a Vgmstream,
    lib: NonNull<Lib>,
    file: *mut StreamFile,
    _bank: PhantomData<&'a [u8]>,
}

impl EngineStream for VgmstreamStream<'_> {
    fn format(&self) -> StreamFormat {
        // SAFETY: `open` checked that the format is non-null; it lives as long as `lib`
        let format = unsafe { &*self.lib.as_ref().format };

        StreamFormat {
            channels: u16::try_from(format.channels).unwrap_or(0),
            sample_rate: u32::try_from(format.sample_rate).unwrap_or(0),
            sample_format: if format.sample_format == SFMT_PCM16 {
                SampleFormat::Pcm16
            } else {
                SampleFormat::Other
            },
            play_forever: format.play_forever,
        }
    }

    fn render(&mut self) -> Result<Rendered<'_>, DecodeError> {
        // SAFETY: `lib` is live and has an open stream
        if unsafe { (self.vgmstream.render)(self.lib.as_ptr()) } < 0 {
            return Err(DecodeError::new(DecodeErrorKind::Render));
        }

        // SAFETY: `open` checked that the decoder is non-null; it lives as long as `lib`
        let decoder = unsafe { &*self.lib.as_ref().decoder };

        let pcm: &[u8] = match usize::try_from(decoder.buf_bytes) {
            // SAFETY: the library keeps `buf_bytes` bytes at `buf` until the next render
            Ok(len) if len > 0 && !decoder.buf.is_null() => unsafe {
                slice::from_raw_parts(decoder.buf.cast::<u8>().cast_const(), len)
            },
            _ => &[],
        };

        Ok(Rendered {
            pcm,
            done: decoder.done,
        })
    }
}

impl Drop for VgmstreamStream<'_> {
    fn drop(&mut self) {
        // SAFETY: both handles are owned by this stream and released exactly once. The engine
        // lets go of the file before it is closed, and the file is closed before the engine
        unsafe {
            (self.vgmstream.close_stream)(self.lib.as_ptr());
            close_file(self.file);
            (self.vgmstream.free)(self.lib.as_ptr());
        }
    }
}

/// Backing state of an in-memory streamfile.
#[derive(Debug)]
struct MemoryFile {
    data: *const u8,
    len: usize,
    name: CString,
}

impl MemoryFile {
    /// Leaks a new streamfile reading from `len` bytes at `data`. Released by its `close`.
    fn create(data: *const u8, len: usize, name: CString) -> *mut StreamFile {
        let state = Box::into_raw(Box::new(Self { data, len, name }));

        Box::into_raw(Box::new(StreamFile {
            user_data: state.cast(),
            read: Some(memory_read),
            get_size: Some(memory_get_size),
            get_name: Some(memory_get_name),
            open: Some(memory_open),
            close: Some(memory_close),
        }))
    }

    /// # Safety
    /// `data` must still point to `len` readable bytes.
    unsafe fn bytes(&self) -> &[u8] {
        // SAFETY: upheld by the caller
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }
}

/// # Safety
/// `file` must be null or a streamfile that has not been closed yet.
unsafe fn close_file(file: *mut StreamFile) {
    // SAFETY: upheld by the caller
    if let Some(close) = unsafe { file.as_ref() }.and_then(|file| file.close) {
        // SAFETY: upheld by the caller
        unsafe { close(file) };
    }
}

/// Returns the part of `data` a read of `length` bytes at `offset` can fill.
fn clamp_read(data: &[u8], offset: usize, length: usize) -> &[u8] {
    let rest = data.get(offset..).unwrap_or_default();
    &rest[..length.min(rest.len())]
}

/// Decides whether a request to open `requested` may be served from this bank.
///
/// Any `.fsb` name is accepted, as is the streamfile's own name.
fn accepts_name(requested: &[u8], own: &[u8]) -> bool {
    requested
        .get(requested.len().saturating_sub(4)..)
        .is_some_and(|extension| extension.eq_ignore_ascii_case(b".fsb"))
        || requested.eq_ignore_ascii_case(own)
}

unsafe extern "C" fn memory_read(
    user_data: *mut c_void,
    dst: *mut u8,
    offset: i64,
    length: c_int,
) -> c_int {
    // SAFETY: `user_data` was installed by `MemoryFile::create`
    let Some(file) = (unsafe { user_data.cast::<MemoryFile>().as_ref() }) else {
        return 0;
    };
    let (Ok(offset), Ok(length)) = (usize::try_from(offset), usize::try_from(length)) else {
        return 0;
    };
    if dst.is_null() {
        return 0;
    }

    // SAFETY: the bank outlives every streamfile opened over it
    let chunk = clamp_read(unsafe { file.bytes() }, offset, length);
    // SAFETY: the library provides `length` writable bytes at `dst`
    unsafe { ptr::copy_nonoverlapping(chunk.as_ptr(), dst, chunk.len()) };

    c_int::try_from(chunk.len()).unwrap_or(0)
}

unsafe extern "C" fn memory_get_size(user_data: *mut c_void) -> i64 {
    // SAFETY: `user_data` was installed by `MemoryFile::create`
    unsafe { user_data.cast::<MemoryFile>().as_ref() }
        .map_or(0, |file| i64::try_from(file.len).unwrap_or(i64::MAX))
}

unsafe extern "C" fn memory_get_name(user_data: *mut c_void) -> *const c_char {
    // SAFETY: `user_data` was installed by `MemoryFile::create`
    unsafe { user_data.cast::<MemoryFile>().as_ref() }
        .map_or(c"".as_ptr(), |file| file.name.as_ptr())
}

unsafe extern "C" fn memory_open(
    user_data: *mut c_void,
    filename: *const c_char,
) -> *mut StreamFile {
    // SAFETY: `user_data` was installed by `MemoryFile::create`
    let Some(file) = (unsafe { user_data.cast::<MemoryFile>().as_ref() }) else {
        return ptr::null_mut();
    };

    let requested = if filename.is_null() {
        file.name.as_c_str()
    } else {
        // SAFETY: the library passes a NUL-terminated name
        unsafe { CStr::from_ptr(filename) }
    };
    let requested = if requested.is_empty() {
        file.name.as_c_str()
    } else {
        requested
    };

    if !accepts_name(requested.to_bytes(), file.name.to_bytes()) {
        return ptr::null_mut();
    }

    MemoryFile::create(file.data, file.len, requested.to_owned())
}

unsafe extern "C" fn memory_close(file: *mut StreamFile) {
    if file.is_null() {
        return;
    }

    // SAFETY: the streamfile and its state were leaked by `MemoryFile::create`
    let file = unsafe { Box::from_raw(file) };
    if !file.user_data.is_null() {
        // SAFETY: as above
        drop(unsafe { Box::from_raw(file.user_data.cast::<MemoryFile>()) });
    }
}
