//! Built-in adapters for external verifiers.

mod abcrown;
mod mnbab;
mod nnenum;
mod ovalbab;
mod verinet;

pub use abcrown::AbCrown;
pub use mnbab::MnBab;
pub use nnenum::Nnenum;
pub use ovalbab::OvalBab;
pub use verinet::VeriNet;

use std::path::PathBuf;

/// Install root of `tool`: `VERIPORT_<TOOL>_HOME`, else
/// `$HOME/.local/share/veriport/<tool>`.
pub fn tool_home(tool: &str) -> PathBuf {
    let var = format!("VERIPORT_{}_HOME", tool.to_ascii_uppercase());
    if let Some(dir) = std::env::var_os(&var) {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".local/share/veriport").join(tool)
}
