//! CLI command implementations.
//!
//! | Module    | Commands handled          |
//! |-----------|---------------------------|
//! | `serve`   | `Serve`                   |
//! | `init`    | `Init`, `Config`          |
//! | `seed`    | `Seed`                    |

pub mod init;
pub mod seed;
pub mod serve;

pub use init::{cmd_config, cmd_init};
pub use seed::{SeedPlan, cmd_seed};
pub use serve::cmd_serve;
