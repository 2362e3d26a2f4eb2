use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sequence number assigned to the very first data packet.
pub const FIRST_SEQ_NO: u32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of messages the application source produces.
    pub num_messages: u64,
    /// Probability that the link drops a packet.
    pub loss_prob: f64,
    /// Probability that the link flips a bit in a delivered packet.
    pub corrupt_prob: f64,
    /// Mean one-way propagation delay.
    pub mean_delay: f64,
    /// Mean time between two application messages.
    pub message_interval: f64,
    pub window_size: u32,
    /// Retransmission timeout.
    pub rxmt_interval: f64,
    /// Diagnostic verbosity, never changes behaviour.
    pub trace: u8,
    pub seed: u64,
    /// Upper bound on processed events before a run is declared stuck.
    pub max_events: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_messages: 10,
            loss_prob: 0.0,
            corrupt_prob: 0.0,
            mean_delay: 5.0,
            message_interval: 10.0,
            window_size: 8,
            rxmt_interval: 30.0,
            trace: 0,
            seed: 0,
            max_events: 1_000_000,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("window size {0} overflows the sequence space")]
    WindowTooLarge(u32),
    #[error("{name} must lie in [0, 1), got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
}

impl SimConfig {
    /// Wraparound modulus for sequence numbers.
    pub fn limit_seq_no(&self) -> u32 {
        self.window_size.saturating_mul(2)
    }

    pub fn window(&self) -> WindowConfig {
        WindowConfig {
            window_size: self.window_size,
            limit_seq_no: self.limit_seq_no(),
            rxmt_interval: self.rxmt_interval,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.window_size.checked_mul(2).is_none() {
            return Err(ConfigError::WindowTooLarge(self.window_size));
        }
        for (name, value) in [
            ("loss_prob", self.loss_prob),
            ("corrupt_prob", self.corrupt_prob),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("mean_delay", self.mean_delay),
            ("message_interval", self.message_interval),
            ("rxmt_interval", self.rxmt_interval),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NotPositive { name, value });
            }
        }
        Ok(())
    }
}

/// The slice of the configuration a protocol entity needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    pub window_size: u32,
    pub limit_seq_no: u32,
    pub rxmt_interval: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        SimConfig::default().window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = SimConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.limit_seq_no(), 16);
    }

    #[test]
    fn rejects_bad_values() {
        let config = SimConfig {
            window_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));

        let config = SimConfig {
            loss_prob: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProbabilityOutOfRange { name: "loss_prob", .. })
        ));

        let config = SimConfig {
            rxmt_interval: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { name: "rxmt_interval", .. })
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: SimConfig = toml::from_str("window_size = 4\nloss_prob = 0.2\n").unwrap();
        assert_eq!(config.window_size, 4);
        assert_eq!(config.loss_prob, 0.2);
        assert_eq!(config.mean_delay, SimConfig::default().mean_delay);
    }
}
