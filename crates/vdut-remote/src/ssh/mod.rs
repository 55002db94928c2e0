//! SSH command and file-transfer channel

mod channel;
mod handler;

pub use channel::SshChannel;
