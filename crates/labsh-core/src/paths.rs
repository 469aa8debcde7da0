//! Well-known filesystem locations.
//!
//! Everything labsh writes lives under `~/.labsh/`. Host identity checks
//! read the user's OpenSSH `~/.ssh/known_hosts`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SessionError, SessionResult};

/// Name used for the state directory, the keyring service, and log targets.
pub const APP_NAME: &str = "labsh";

fn home() -> SessionResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| SessionError::Other("cannot determine home directory".into()))
}

/// `~/.labsh`
pub fn state_dir() -> SessionResult<PathBuf> {
    Ok(home()?.join(format!(".{APP_NAME}")))
}

/// `~/.labsh/sessions/session.toml`
pub fn session_record_path() -> SessionResult<PathBuf> {
    Ok(state_dir()?.join("sessions").join("session.toml"))
}

/// `~/.ssh/known_hosts`
pub fn known_hosts_path() -> SessionResult<PathBuf> {
    Ok(home()?.join(".ssh").join("known_hosts"))
}

/// Create `dir` (and parents) if missing, restricting it to the owner.
pub fn ensure_private_dir(dir: &Path) -> SessionResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}
