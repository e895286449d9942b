// Native volume backend contract and its libloading-backed implementation.
use std::fmt;
use std::os::raw::c_int;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::guard::LoadedLibrary;

pub const MIN_VOLUME: i32 = 0;
pub const MAX_VOLUME: i32 = 100;

const GET_VOLUME_SYMBOL: &[u8] = b"get_volume\0";
const SET_VOLUME_SYMBOL: &[u8] = b"set_volume\0";

type GetVolumeFn = unsafe extern "C" fn() -> c_int;
type SetVolumeFn = unsafe extern "C" fn(c_int);

/// The two operations the facade delegates to. Implementations never cache.
pub trait Backend: Send + Sync {
    fn get_volume(&self) -> Result<i32, Error>;

    /// Called only with values in `MIN_VOLUME..=MAX_VOLUME`.
    fn set_volume(&self, value: i32) -> Result<(), Error>;
}

pub struct NativeBackend {
    library: Arc<LoadedLibrary>,
    get_volume: GetVolumeFn,
    set_volume: SetVolumeFn,
}

impl NativeBackend {
    /// Resolves the backend entry points from a loaded library.
    pub fn bind(library: Arc<LoadedLibrary>) -> Result<Self, Error> {
        // SAFETY: the signatures match the exported C declarations in `native/`. The copied
        // function pointers stay valid because `library` is kept alive alongside them.
        let (get_volume, set_volume) = unsafe {
            let get = library
                .library()
                .get::<GetVolumeFn>(GET_VOLUME_SYMBOL)
                .map_err(|err| symbol_error(&library, "get_volume", err))?;
            let set = library
                .library()
                .get::<SetVolumeFn>(SET_VOLUME_SYMBOL)
                .map_err(|err| symbol_error(&library, "set_volume", err))?;
            (*get, *set)
        };
        Ok(Self {
            library,
            get_volume,
            set_volume,
        })
    }

    pub fn library(&self) -> &LoadedLibrary {
        &self.library
    }
}

impl Backend for NativeBackend {
    fn get_volume(&self) -> Result<i32, Error> {
        // SAFETY: see `bind`.
        let raw = unsafe { (self.get_volume)() };
        if raw < 0 {
            return Err(Error::new(ErrorKind::Backend)
                .with_message(format!("native get_volume failed with status {raw}")));
        }
        if raw > MAX_VOLUME {
            return Err(Error::new(ErrorKind::Backend)
                .with_message(format!("native get_volume returned out-of-range value {raw}")));
        }
        Ok(raw)
    }

    fn set_volume(&self, value: i32) -> Result<(), Error> {
        // SAFETY: see `bind`.
        unsafe { (self.set_volume)(value) };
        Ok(())
    }
}

impl fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBackend")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

fn symbol_error(library: &LoadedLibrary, name: &str, err: libloading::Error) -> Error {
    Error::new(ErrorKind::NativeLoad)
        .with_message(format!("native library does not export `{name}`"))
        .with_path(library.path())
        .with_source(err)
}
