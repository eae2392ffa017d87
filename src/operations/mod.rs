/// Module for mirroring a local directory tree to the remote server
pub(crate) mod mirror;

/// Module for uploading single files to the remote server
pub(crate) mod upload;
