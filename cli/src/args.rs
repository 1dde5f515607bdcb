//! The launch contract: a depot name followed by good/quantity pairs.

use std::process;

use thiserror::Error;

/// Characters that may not appear in a depot or good name.
const BAD_CHARS: [char; 4] = [' ', '\n', '\r', ':'];

/// Rejection of the command line. Each variant carries the exact
/// diagnostic for stderr and maps to its own exit status.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    /// The name/pair structure is off.
    #[error("Usage: 2310depot name {{goods qty}}")]
    Usage,
    /// The depot name or a good name is empty or carries a forbidden
    /// character.
    #[error("Invalid name(s)")]
    Name,
    /// A quantity is not a plain non-negative decimal.
    #[error("Invalid quantity")]
    Quantity,
}

impl ArgsError {
    /// The exit status this rejection maps to.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage => 1,
            Self::Name => 2,
            Self::Quantity => 3,
        }
    }

    /// Print the diagnostic to stderr and terminate with the matching
    /// status.
    pub fn exit(&self) -> ! {
        eprintln!("{self}");
        process::exit(self.exit_code())
    }
}

/// Validated launch parameters.
#[derive(Debug, PartialEq, Eq)]
pub struct Arguments {
    /// This depot's announced name.
    pub name: String,
    /// Initial goods, in command-line order.
    pub stock: Vec<(String, i64)>,
}

impl Arguments {
    /// Parse everything after the program name: `name {good qty}`.
    ///
    /// # Errors
    /// The first failing check wins: argument count, then each
    /// name/quantity pair left to right.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let args: Vec<String> = args.into_iter().collect();
        if args.len() % 2 == 0 {
            return Err(ArgsError::Usage);
        }
        let name = valid_name(&args[0])?;
        let mut stock = Vec::new();
        for pair in args[1..].chunks_exact(2) {
            let good = valid_name(&pair[0])?;
            let quantity = valid_quantity(&pair[1])?;
            stock.push((good, quantity));
        }
        Ok(Self { name, stock })
    }
}

fn valid_name(argument: &str) -> Result<String, ArgsError> {
    if argument.is_empty() || argument.contains(BAD_CHARS) {
        return Err(ArgsError::Name);
    }
    Ok(argument.to_owned())
}

fn valid_quantity(argument: &str) -> Result<i64, ArgsError> {
    match argument.parse::<i64>() {
        Ok(quantity) if quantity >= 0 => Ok(quantity),
        _ => Err(ArgsError::Quantity),
    }
}
