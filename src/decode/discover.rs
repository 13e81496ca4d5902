use std::{
    env,
    ffi::OsString,
    iter,
    path::{Path, PathBuf},
};

#[cfg(windows)]
pub(crate) const LIBRARY_NAME: &str = "libvgmstream.dll";
#[cfg(target_os = "macos")]
pub(crate) const LIBRARY_NAME: &str = "libvgmstream.dylib";
#[cfg(not(any(windows, target_os = "macos")))]
pub(crate) const LIBRARY_NAME: &str = "libvgmstream.so";

#[cfg(windows)]
const PATH_VARIABLES: &[&str] = &["LIBVGMSTREAM_DLL_PATH", "VGMSTREAM_DLL_PATH"];
#[cfg(target_os = "macos")]
const PATH_VARIABLES: &[&str] = &[
    "LIBVGMSTREAM_SO_PATH",
    "VGMSTREAM_SO_PATH",
    "LIBVGMSTREAM_DYLIB_PATH",
    "VGMSTREAM_DYLIB_PATH",
];
#[cfg(not(any(windows, target_os = "macos")))]
const PATH_VARIABLES: &[&str] = &["LIBVGMSTREAM_SO_PATH", "VGMSTREAM_SO_PATH"];

// searched under the executable's directory and its parent
const RELATIVE_DIRS: &[&str] = &["", "vgm", "lib"];

/// Lists every location the library may be loaded from, in search order.
///
/// Explicit paths from the environment come first, then the working directory, then the
/// directory of the running executable and its parent.
pub(crate) fn candidates(
    var: impl Fn(&str) -> Option<OsString>,
    cwd: Option<&Path>,
    exe_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = PATH_VARIABLES
        .iter()
        .filter_map(|name| var(name))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect();

    paths.extend(cwd.map(|cwd| cwd.join(LIBRARY_NAME)));

    if let Some(dir) = exe_dir {
        for base in iter::once(dir).chain(dir.parent()) {
            paths.extend(
                RELATIVE_DIRS
                    .iter()
                    .map(|relative| base.join(relative).join(LIBRARY_NAME)),
            );
        }
    }

    paths
}

/// Picks the first candidate that exists. `None` means the bare library name should be
/// handed to the OS loader.
pub(crate) fn search(
    candidates: impl IntoIterator<Item = PathBuf>,
    exists: impl Fn(&Path) -> bool,
) -> Option<PathBuf> {
    candidates.into_iter().find(|path| exists(path))
}

/// Runs the search against the real process environment.
pub(crate) fn locate() -> Option<PathBuf> {
    let cwd = env::current_dir().ok();
    let exe = env::current_exe().ok();

    search(
        candidates(
            |name| env::var_os(name),
            cwd.as_deref(),
            exe.as_deref().and_then(Path::parent),
        ),
        Path::is_file,
    )
}
