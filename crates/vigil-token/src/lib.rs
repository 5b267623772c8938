//! Bearer token decoding for Vigil.
//!
//! The console never verifies signatures: tokens are issued and signed by
//! the auth server, and this crate only reads them to answer three
//! questions:
//!
//! - **When does it expire?** Drives the refresh schedule.
//! - **Is it still usable?** Fail-closed: anything unreadable is expired.
//! - **Who is it for?** Display name, subject id, and the primary role.
//!
//! # Wire format
//!
//! ```text
//! base64url(header JSON) . base64url(payload JSON) . base64url(signature)
//! ```
//!
//! # How it fits in the stack
//!
//! ```text
//! Session Layer (above)  ← decodes fresh tokens after every refresh
//!     ↕
//! Token Layer (this crate)  ← pure functions, no I/O, no clock reads
//! ```

mod claims;
mod codec;
mod error;

pub use claims::{DecodedToken, RolePolicy, UserInfo, UNKNOWN_USER};
pub use codec::TokenCodec;
pub use error::TokenError;
