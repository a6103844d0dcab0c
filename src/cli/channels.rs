//! Channel listing command.

use crate::channels::ChannelCatalog;

/// Print the channel kinds the catalog can build.
pub fn run_channels_command(catalog: &ChannelCatalog) {
    println!("Available channels:");
    for name in catalog.available() {
        println!("  {}", name);
    }
    println!("\nActivate with --inputs <name>[,<name>...] or CHATOPS_INPUTS.");
}
