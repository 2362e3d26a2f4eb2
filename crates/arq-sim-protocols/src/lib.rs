//! Built-in reliability protocols for the ARQ simulator.

pub mod go_back_n;
pub mod selective_repeat;
pub mod seq;

#[cfg(test)]
mod testing;

use anyhow::Result;
use arq_sim_abstract::{TransportProtocol, WindowConfig};

pub use go_back_n::{GbnReceiver, GbnSender};
pub use selective_repeat::{SrReceiver, SrSender};
pub use seq::SeqSpace;

/// Built-in Rust implementations selectable by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BuiltinProtocol {
    #[default]
    SelectiveRepeat,
    GoBackN,
}

impl BuiltinProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinProtocol::SelectiveRepeat => "sr",
            BuiltinProtocol::GoBackN => "gbn",
        }
    }

    pub fn sender(&self, window: WindowConfig) -> Box<dyn TransportProtocol> {
        match self {
            BuiltinProtocol::SelectiveRepeat => Box::new(SrSender::new(window)),
            BuiltinProtocol::GoBackN => Box::new(GbnSender::new(window)),
        }
    }

    pub fn receiver(&self, window: WindowConfig) -> Box<dyn TransportProtocol> {
        match self {
            BuiltinProtocol::SelectiveRepeat => Box::new(SrReceiver::new(window)),
            BuiltinProtocol::GoBackN => Box::new(GbnReceiver::new(window)),
        }
    }

    pub fn load_pair(
        &self,
        window: WindowConfig,
    ) -> (Box<dyn TransportProtocol>, Box<dyn TransportProtocol>) {
        (self.sender(window), self.receiver(window))
    }
}

/// Map a user-visible builtin name to the protocol enum.
pub fn builtin_by_name(name: &str) -> Result<BuiltinProtocol> {
    match name {
        "sr" | "selective-repeat" => Ok(BuiltinProtocol::SelectiveRepeat),
        "gbn" | "go-back-n" => Ok(BuiltinProtocol::GoBackN),
        other => anyhow::bail!("Unknown builtin '{other}'. Try 'sr' or 'gbn'."),
    }
}
