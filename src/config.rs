//! Encode/decode configuration — `spec.md` §6's options table and §9's
//! "accept an explicit `EncodeConfig`/`DecodeConfig` value and thread it
//! through" design note (replacing the original's global mutable settings).

use crate::compression::CompressionLevel;
use crate::recovery::{NGROUP_MAX, NGROUP_MIN};
use thiserror::Error;

/// Maximum password length, bytes (`spec.md` §6: "`password` ≤ 32 bytes,
/// NUL-terminated").
pub const PASSWORD_MAX_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("dpi {0} out of range [40,300]")]
    DpiOutOfRange(u32),
    #[error("dotpercent {0} out of range [50,100]")]
    DotPercentOutOfRange(u32),
    #[error("redundancy {0} out of range [{NGROUP_MIN},{NGROUP_MAX}]")]
    RedundancyOutOfRange(u32),
    #[error("compression level {0} is not one of 0 (none), 1 (fast), 2 (max)")]
    InvalidCompressionLevel(u8),
    #[error("password is {0} bytes, exceeds the {PASSWORD_MAX_LEN}-byte limit")]
    PasswordTooLong(usize),
    #[error("encryption is enabled but no password was supplied")]
    MissingPassword,
}

/// Printable-area insets, in hundredths of an inch (matches the original's
/// `margin*` option granularity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 50,
            right: 50,
            top: 50,
            bottom: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeConfig {
    pub dpi: u32,
    pub dotpercent: u32,
    pub redundancy: u32,
    pub compression: CompressionLevel,
    pub encryption: bool,
    pub password: Option<String>,
    pub printheader: bool,
    pub printborder: bool,
    pub margins: Margins,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            dotpercent: 70,
            redundancy: 5,
            compression: CompressionLevel::Fast,
            encryption: false,
            password: None,
            printheader: true,
            printborder: false,
            margins: Margins::default(),
        }
    }
}

impl EncodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(40..=300).contains(&self.dpi) {
            return Err(ConfigError::DpiOutOfRange(self.dpi));
        }
        if !(50..=100).contains(&self.dotpercent) {
            return Err(ConfigError::DotPercentOutOfRange(self.dotpercent));
        }
        if !(NGROUP_MIN..=NGROUP_MAX).contains(&self.redundancy) {
            return Err(ConfigError::RedundancyOutOfRange(self.redundancy));
        }
        match &self.password {
            Some(p) if p.len() > PASSWORD_MAX_LEN => {
                return Err(ConfigError::PasswordTooLong(p.len()));
            }
            None if self.encryption => return Err(ConfigError::MissingPassword),
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DecodeConfig {
    pub dpi_hint: u32,
    pub bestquality: bool,
    pub autosave: bool,
    pub password: Option<String>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            dpi_hint: 200,
            bestquality: false,
            autosave: false,
            password: None,
        }
    }
}

impl DecodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(40..=300).contains(&self.dpi_hint) {
            return Err(ConfigError::DpiOutOfRange(self.dpi_hint));
        }
        if let Some(p) = &self.password {
            if p.len() > PASSWORD_MAX_LEN {
                return Err(ConfigError::PasswordTooLong(p.len()));
            }
        }
        Ok(())
    }
}
