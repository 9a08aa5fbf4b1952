//! pce-oci CLI - extract Pextra OCI images into directories.

pub mod commands;
