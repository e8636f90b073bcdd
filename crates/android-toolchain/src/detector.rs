//! Tool Detection
//!
//! Locates the Android SDK command line tools the benchmark drives.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use which::which_in;

/// SDK install locations relative to the home directory
const HOME_TOOL_LOCATIONS: &[&str] = &[
    "AppData/Local/Android/Sdk/platform-tools",
    "AppData/Local/Android/Sdk/emulator",
    "AppData/Local/Android/Sdk/tools",
    "AppData/Local/Android/Sdk/tools/bin",
    "Library/Android/sdk/platform-tools",
    "Library/Android/sdk/emulator",
    "Library/Android/sdk/tools",
    "Library/Android/sdk/tools/bin",
    "android-toolchain/sdk/platform-tools",
    "android-toolchain/sdk/emulator",
    "android-toolchain/sdk/tools",
    "android-toolchain/sdk/tools/bin",
];

/// Tool detection errors
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("{0} not on path.")]
    ToolNotFound(AndroidTool),
}

/// SDK tools required by the benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndroidTool {
    Adb,
    AvdManager,
    Emulator,
    SdkManager,
}

impl AndroidTool {
    pub fn name(&self) -> &'static str {
        match self {
            AndroidTool::Adb => "adb",
            AndroidTool::AvdManager => "avdmanager",
            AndroidTool::Emulator => "emulator",
            AndroidTool::SdkManager => "sdkmanager",
        }
    }

    /// File names tried, in order
    pub fn candidates(&self) -> [String; 3] {
        let name = self.name();
        [
            name.to_string(),
            format!("{}.exe", name),
            format!("{}.bat", name),
        ]
    }
}

impl std::fmt::Display for AndroidTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved tool paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidTools {
    pub adb: PathBuf,
    pub avdmanager: PathBuf,
    pub emulator: PathBuf,
    pub sdkmanager: PathBuf,
}

impl AndroidTools {
    /// SDK root, the parent of the emulator's directory
    pub fn sdk_root(&self) -> PathBuf {
        self.emulator
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Finds tools on the search path, then under well-known SDK folders in
/// the home directory.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    search_path: Option<OsString>,
    home: Option<PathBuf>,
    cwd: PathBuf,
}

impl ToolLocator {
    pub fn new(search_path: Option<OsString>, home: Option<PathBuf>, cwd: PathBuf) -> Self {
        Self { search_path, home, cwd }
    }

    /// Locator for the current process environment
    pub fn from_env() -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
            home: crate::env::home_dir(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Locate a single tool
    pub fn locate(&self, tool: AndroidTool) -> Option<PathBuf> {
        for file_name in tool.candidates() {
            if let Some(path) = self.find_on_path(&file_name) {
                debug!("Found {} at {:?}", file_name, path);
                return Some(path);
            }

            if let Some(path) = self.find_in_home(&file_name) {
                debug!("Found {} under home at {:?}", file_name, path);
                return Some(path);
            }
        }

        None
    }

    /// Locate every required tool, failing on the first one missing
    pub fn locate_all(&self) -> Result<AndroidTools, DetectionError> {
        let find = |tool: AndroidTool| self.locate(tool).ok_or(DetectionError::ToolNotFound(tool));

        let tools = AndroidTools {
            adb: find(AndroidTool::Adb)?,
            avdmanager: find(AndroidTool::AvdManager)?,
            emulator: find(AndroidTool::Emulator)?,
            sdkmanager: find(AndroidTool::SdkManager)?,
        };

        info!("Using Android SDK tools from {:?}", tools.sdk_root());
        Ok(tools)
    }

    fn find_on_path(&self, file_name: &str) -> Option<PathBuf> {
        let local = self.cwd.join(file_name);
        if local.is_file() {
            return Some(absolute(&local));
        }

        let search_path = self.search_path.as_ref()?;
        which_in(file_name, Some(search_path), &self.cwd).ok()
    }

    fn find_in_home(&self, file_name: &str) -> Option<PathBuf> {
        let home = self.home.as_ref()?;
        HOME_TOOL_LOCATIONS
            .iter()
            .map(|location| home.join(location).join(file_name))
            .find(|candidate| candidate.is_file())
            .map(|candidate| absolute(&candidate))
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
