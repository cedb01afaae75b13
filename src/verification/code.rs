//! Verification code generation.

use rand::Rng;

/// Number of digits in a verification code.
pub const CODE_DIGITS: usize = 6;

/// Exclusive upper bound of the numeric code space.
const CODE_SPACE: u32 = 1_000_000;

/// Source of verification codes.
pub trait CodeGenerator: Send + Sync {
    /// Produce a fresh code.
    fn generate(&self) -> String;
}

/// Uniform six-digit codes from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        format_code(rng.random_range(0..CODE_SPACE))
    }
}

/// Zero-pad a numeric code to [`CODE_DIGITS`] digits.
pub fn format_code(value: u32) -> String {
    format!("{:0width$}", value % CODE_SPACE, width = CODE_DIGITS)
}
