// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Executes the `version` command to display version information.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("nxbridge - Omron NX controller ↔ OPC UA bridge");
    println!();
    println!("Version Information:");
    println!("  nxbridge-bin:    {}", crate::VERSION);
    println!("  nxbridge-core:   {}", nxbridge_core::VERSION);
    println!("  nxbridge-config: {}", nxbridge_config::VERSION);
    println!("  nxbridge-opcua:  {}", nxbridge_opcua::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("Features:");
    println!(
        "  OPC UA server: {}",
        if cfg!(feature = "opcua-server") { "enabled" } else { "disabled (in-memory address space)" }
    );
    println!(
        "  Controller:    {}",
        if cfg!(feature = "eip") { "simulated, eip" } else { "simulated" }
    );
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
