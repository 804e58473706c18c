//! high-level operations on a stew working copy

mod checkout;
mod init;
mod log;
mod pin;
mod status;

pub use checkout::{checkout, Checkout};
pub use init::{init, InitReport};
pub use log::{log, LogEntry};
pub use pin::{pin, pin_and_push, push_version, PinReport, Pinned, SyncStatus};
pub use status::{status, Status};
