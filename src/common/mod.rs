/// Shared file-service helpers used across the engine.
pub mod io;

pub use io::{
    FileData, create_empty_file, disk_free_space, file_size, open_scan, read_file_bytes,
    remove_file_quiet, resolve_tmp_dir,
};
