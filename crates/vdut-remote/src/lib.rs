//! vdut-remote: SSH implementation of the remote channel
//!
//! Every call opens its own authenticated connection, runs one command or
//! one SFTP upload, and disconnects before returning.

pub mod ssh;

pub use ssh::SshChannel;
