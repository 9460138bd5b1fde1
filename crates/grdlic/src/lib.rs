//! A rust interface to a dongle based licensing API.
//!
//! This crate has two parts:
//! * The [gateway traits](`crate::gateway`) that applications program against, and
//! * A [simulated backend](`crate::sim`) that implements them in-process.
//!
//! The traits mirror the shape of the vendor API: global queries live on [`Gateway`] and
//! everything that requires a login lives on [`Feature`]. Every call that the vendor API
//! answers with a status code returns a `Result` whose error is the non-OK [`Error`].

pub use error::{status_text, Error, Status};
pub use gateway::{Feature, Gateway};
pub use types::{ApiVersion, EncryptMode, RemoteMode, VendorCodes, Visibility, MESSAGE_SIZE};

pub mod error;
pub mod gateway;
pub mod sim;
pub mod types;
