//! Runtime discovery of the game server installation
//!
//! Search order:
//! 1. `DEVBRIDGE_GAME_DIR` environment override
//! 2. Per-OS data directory + the launcher's standard game package path
//! 3. Linux Flatpak launcher data directory

use std::path::{Path, PathBuf};

/// Game package directory below the platform data dir, as laid out by the
/// official launcher
const GAME_PACKAGE_SUBDIR: &str = "Hytale/install/release/package/game/latest";

/// Flatpak launcher data directory below the user's home (Linux only)
const FLATPAK_DATA_SUBDIR: &str = ".var/app/com.hypixel.HytaleLauncher/data";

/// Environment variable overriding the game package directory
pub const GAME_DIR_ENV: &str = "DEVBRIDGE_GAME_DIR";

/// Find the game package directory, or None when no installation is present
pub fn find_game_package_dir() -> Option<PathBuf> {
    let override_dir = std::env::var_os(GAME_DIR_ENV).map(PathBuf::from);
    resolve_game_package_dir(override_dir.as_deref(), dirs::data_dir(), dirs::home_dir())
}

fn resolve_game_package_dir(
    override_dir: Option<&Path>,
    data_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(dir) = override_dir {
        if dir.is_dir() {
            return Some(dir.to_path_buf());
        }
    }

    if let Some(data) = data_dir {
        let standard = data.join(GAME_PACKAGE_SUBDIR);
        if standard.is_dir() {
            return Some(standard);
        }
    }

    if cfg!(target_os = "linux") {
        if let Some(home) = home_dir {
            let flatpak = home.join(FLATPAK_DATA_SUBDIR).join(GAME_PACKAGE_SUBDIR);
            if flatpak.is_dir() {
                return Some(flatpak);
            }
        }
    }

    None
}

/// Find the server jar inside the game package, or None when missing
pub fn find_server_jar() -> Option<PathBuf> {
    let jar = find_game_package_dir()?.join("Server").join("HytaleServer.jar");
    jar.is_file().then_some(jar)
}

/// Find the assets archive inside the game package, or None when missing
pub fn find_assets_zip() -> Option<PathBuf> {
    let zip = find_game_package_dir()?.join("Assets.zip");
    zip.is_file().then_some(zip)
}

/// Warning printed when no installation can be located. The bridge keeps
/// running detached; this tells the user how to fix it.
pub fn missing_install_warning() -> String {
    format!(
        "\n\
         WARNING: game server installation not found!\n\
         The bridge will run detached: clients can connect, but no server\n\
         process is under agent control.\n\
         \n\
         To fix this, either:\n\
         - Install the game via the official launcher\n\
         - Set {}=/path/to/game/package\n\
         \n\
         Expected locations:\n\
         Windows: %APPDATA%/{}\n\
         macOS: ~/Library/Application Support/{}\n\
         Linux: ~/.local/share/{}\n\
         Flatpak: ~/{}/{}\n",
        GAME_DIR_ENV,
        GAME_PACKAGE_SUBDIR,
        GAME_PACKAGE_SUBDIR,
        GAME_PACKAGE_SUBDIR,
        FLATPAK_DATA_SUBDIR,
        GAME_PACKAGE_SUBDIR,
    )
}
