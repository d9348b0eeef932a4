pub mod dms;

use std::fmt;

/// Broad classification of failures, so that callers can present one
/// uniform "operation failed, here is why" message per class.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ErrorKind {
    /// Malformed or undecodable binary content. Always recoverable by
    /// discarding the offending buffer or frame.
    DataFormat,
    /// Environment or setup problems not inherent to the binary data.
    Configuration,
    /// I/O-level failures unrelated to content.
    System,
}

/// Error type for working with cartridge images and device transfers.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Error {
    InvalidLength(u32, u32),   // actual, expected
    InvalidChecksum(u8, u8),   // actual, expected
    InvalidData(u32),          // offset in data
    UnknownFormat,             // no cartridge layout validated
    IncompleteDump(u32, u32),  // units received, units expected
    PortNotFound(String),      // named MIDI port does not exist
    ChannelNotOpen,            // transfer attempted on a half-open device
    IncompatibleStores,        // cross-copy between different generations
    DuplicateName(String),     // store name already taken
    Io(String),                // channel or file level failure
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidLength(..)
            | Error::InvalidChecksum(..)
            | Error::InvalidData(..)
            | Error::UnknownFormat
            | Error::IncompleteDump(..) => ErrorKind::DataFormat,
            Error::PortNotFound(..)
            | Error::ChannelNotOpen
            | Error::IncompatibleStores
            | Error::DuplicateName(..) => ErrorKind::Configuration,
            Error::Io(..) => ErrorKind::System,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Error::InvalidLength(actual, expected) => format!("Got {} bytes of data, expected {} bytes.", actual, expected),
            Error::InvalidChecksum(actual, expected) => format!("Computed checksum was {:02X}H, expected {:02X}H.", actual, expected),
            Error::InvalidData(offset) => format!("Invalid data at offset {}.", offset),
            Error::UnknownFormat => String::from("Unknown cartridge format."),
            Error::IncompleteDump(received, expected) => format!("Device dump ended after {} of {} units.", received, expected),
            Error::PortNotFound(name) => format!("MIDI port '{}' not found.", name),
            Error::ChannelNotOpen => String::from("Device channel is not open."),
            Error::IncompatibleStores => String::from("Instrument stores have incompatible layouts."),
            Error::DuplicateName(name) => format!("Device or cartridge named '{}' already exists.", name),
            Error::Io(message) => format!("I/O error: {}.", message),
        })
    }
}

impl std::error::Error for Error {}

// Here is a trick learned from "Programming Rust" 2nd Ed., p. 280.
// Define associated consts in a trait, but don't give them a value.
// Let the implementor of the trait do that.
pub trait Ranged {
    const FIRST: i32;
    const LAST: i32;
    const DEFAULT: i32;

    fn new(value: i32) -> Self;
    fn value(&self) -> i32;
    fn contains(value: i32) -> bool;
    fn random() -> Self;
}

// The `ranged_impl` macro generates an implementation of the `Ranged` trait,
// along with implementations of the `Default` and `Display` traits based on
// the values supplied as parameters (type name, first, last, default).
#[macro_export]
macro_rules! ranged_impl {
    ($typ:ty, $first:expr, $last:expr, $default:expr) => {
        impl Ranged for $typ {
            const FIRST: i32 = $first;
            const LAST: i32 = $last;
            const DEFAULT: i32 = $default;

            fn new(value: i32) -> Self {
                if Self::contains(value) {
                    Self(value)
                }
                else {
                    panic!("expected value in range [{}...{}], got {}",
                        Self::FIRST, Self::LAST, value);
                }
            }

            fn value(&self) -> i32 { self.0 }

            fn contains(value: i32) -> bool {
                value >= Self::FIRST && value <= Self::LAST
            }

            fn random() -> Self {
                let mut rng = rand::rng();
                Self::new(rand::Rng::random_range(&mut rng, Self::FIRST..=Self::LAST))
            }
        }

        impl Default for $typ {
            fn default() -> Self {
                Self::new(Self::DEFAULT)
            }
        }

        impl fmt::Display for $typ {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    }
}
