use std::path::{Path, PathBuf};

pub use vigil_core::config::vigil_root;
pub use vigil_reconcile::file_store::{cache_dir_at, heartbeat_path_at};
pub use vigil_reconcile::fs_source::source_dir_at;

pub const CONTROL_SOCKET: &str = "vigil.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    vigil_root(home).join(CONTROL_SOCKET)
}
