//! # fsbx
//!
//! `fsbx` is a library for indexing FMOD sound banks (FSB4 and FSB5) and extracting their
//! samples as playable files.
//!
//! A [`Container`] is built from a byte buffer and lists the bank's samples by 1-based index
//! and by name. [`Container::get`] hands each sample to `libvgmstream`, if it can be found at
//! runtime, and returns the decoded audio as a WAV file. Without the library, or when decoding
//! fails, the stored bytes are returned and labelled by signature or by codec.
//!
//! ```no_run
//! use fsbx::Container;
//!
//! let bank = Container::read_file("music.fsb")?;
//! for (index, name) in (1..).zip(bank.names()) {
//!     let sample = bank.get(index)?;
//!     std::fs::write(format!("{name}.{}", sample.extension()), sample.data())?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(clippy::pedantic, future_incompatible)]
#![deny(
    let_underscore_drop,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_abi,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    nonstandard_style,
    noop_method_call,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused,
    unused_crate_dependencies,
    unused_import_braces,
    unused_lifetimes,
    unused_macro_rules,
    unused_qualifications,
    unused_results
)]

mod bytes;
mod container;
mod decode;
mod encode;
mod error;
mod header;
mod read;
mod sniff;

pub use container::{Container, Extracted};
pub use decode::{error::DecodeError, system_decoder, Decoder, NoDecoder, Pcm16};
pub use error::{last_error, Error, ErrorKind};
pub use header::{Codec, Format, Loop, Sample};
pub use sniff::Extension;
