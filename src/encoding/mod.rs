//! Wire format of data frames and MAC commands.

pub mod creator;
pub mod maccommandcreator;
pub mod maccommands;
pub mod parser;

/// Encoding and decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error {
    MarginOutOfRange,
    DelayOutOfRange,
    BufferTooSmall,
    IncorrectSizeForMacCommand,
    UnknownMacCommand,
    UnsupportedMessageType,
    PhyDataEmpty,
    InsufficeientNumberOfBytes,
    UnsupportedMajorVersion,
    MacCommandTooBigForFOpts,
    DataAndMacCommandsInPayloadNotAllowed,
    FRMPayloadWithFportZero,
    MissingFPort,
    WrongDirection,
}

impl<D> From<Error> for crate::Error<D>
where
    D: crate::device::Device,
{
    fn from(value: Error) -> Self {
        Self::Encoding(value)
    }
}
