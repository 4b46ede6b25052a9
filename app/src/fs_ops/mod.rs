//! Atomic filesystem primitives shared by every transfer strategy.
//!
//! Every destination-writing operation here shares one collision-resolution
//! loop: try the desired path, then `_1`, `_2`, ... up to `max_attempts`,
//! returning the first path it wins. A `FileExists`-shaped failure from the
//! exclusive-create step drives the loop; anything else is fatal.

pub mod atomic;
pub mod permissions;

pub use atomic::{atomic_copy, atomic_hardlink, atomic_move, atomic_write, FsOpError};
pub use permissions::{log_path_permission_context, log_transfer_permission_context};
