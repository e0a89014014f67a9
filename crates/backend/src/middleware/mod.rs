mod version;

pub use version::{SERVER_VERSION_HEADER, add_version_headers};
