// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Start the bridge
//! - `validate`: Validate configuration and tag definitions
//! - `version`: Show version information

mod run;
mod validate;
mod version;

pub use run::run;
pub use validate::validate;
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run => run::run(&cli).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}
