//! Purpose: Host platform probe and the logical identity of the native library.
//! Exports: `Platform`, `LibraryExtension`, `LibraryIdentity`, name helpers.
//! Role: Single place that decides Windows vs. Unix naming for the payload.
//! Invariants: Exactly one platform branch is active; the probe runs once per process.
//! Invariants: The extension is always derived from the probe, never from caller input.
use std::fmt;
use std::sync::OnceLock;

const LIB_NAME: &str = "volctl";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    /// Probed once from the host OS name.
    pub fn host() -> Self {
        static HOST: OnceLock<Platform> = OnceLock::new();
        *HOST.get_or_init(|| Self::classify(std::env::consts::OS))
    }

    /// Any OS name containing "win" (case-insensitive) is Windows; everything else is Unix.
    pub fn classify(os_name: &str) -> Self {
        if os_name.to_ascii_lowercase().contains("win") {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn extension(self) -> LibraryExtension {
        match self {
            Platform::Windows => LibraryExtension::Dll,
            Platform::Unix => LibraryExtension::So,
        }
    }

    /// Maps a bare library name to its platform file name (`libfoo.so`, `foo.dll`).
    pub fn map_library_name(self, name: &str) -> String {
        match self {
            Platform::Windows => format!("{name}.{}", self.extension()),
            Platform::Unix => format!("lib{name}.{}", self.extension()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LibraryExtension {
    So,
    Dll,
}

impl LibraryExtension {
    pub fn as_str(self) -> &'static str {
        match self {
            LibraryExtension::So => "so",
            LibraryExtension::Dll => "dll",
        }
    }
}

impl fmt::Display for LibraryExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LibraryIdentity {
    pub logical_name: String,
    pub platform_extension: LibraryExtension,
    pub platform_base_name: String,
}

impl LibraryIdentity {
    pub fn for_platform(platform: Platform) -> Self {
        let file_name = platform.map_library_name(LIB_NAME);
        Self {
            logical_name: LIB_NAME.to_string(),
            platform_extension: platform.extension(),
            platform_base_name: substring_before_last(&file_name, '.').to_string(),
        }
    }

    pub fn host() -> Self {
        Self::for_platform(Platform::host())
    }

    /// Name of the bundled resource: `<platformBaseName>.<extension>`.
    pub fn resource_name(&self) -> String {
        format!("{}.{}", self.platform_base_name, self.platform_extension)
    }
}

pub fn is_windows() -> bool {
    Platform::host() == Platform::Windows
}

/// Default library file name for the host, including extension.
pub fn default_lib_file_name() -> String {
    Platform::host().map_library_name(LIB_NAME)
}

/// Default library file name for the host, excluding extension.
pub fn default_lib_name() -> String {
    substring_before_last(&default_lib_file_name(), '.').to_string()
}

/// Everything before the last `ch`; the whole input when `ch` is absent.
pub fn substring_before_last(s: &str, ch: char) -> &str {
    match s.rfind(ch) {
        Some(index) => &s[..index],
        None => s,
    }
}

/// Everything after the last `ch`; the whole input when `ch` is absent.
pub fn substring_after_last(s: &str, ch: char) -> &str {
    match s.rfind(ch) {
        Some(index) => &s[index + ch.len_utf8()..],
        None => s,
    }
}
