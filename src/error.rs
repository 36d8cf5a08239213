/// Errors reported by the codec, the command engine and the client API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A caller supplied an out-of-range or unrecognized parameter.
    #[error("invalid argument")]
    InvalidArgument,
    /// Inbound frame has the wrong length or bad header/tail bytes.
    #[error("malformed frame")]
    MalformedFrame,
    #[error("bad checksum")]
    ChecksumMismatch,
    /// A valid 0xC5 reply carried a setting id this driver does not know.
    #[error("unknown setting id {0:#04x}")]
    UnknownSetting(u8),
    #[error("unknown frame type {0:#04x}")]
    UnknownFrameType(u8),
    /// The sensor never confirmed the command within the retry budget.
    #[error("command not confirmed after all retries")]
    RetryExhausted,
    #[error("connection closed")]
    ConnectionClosed,
    /// No free completion slot or queue position is left.
    #[error("command queue full")]
    QueueFull,
    #[error("too many event subscribers")]
    TooManySubscribers,
    #[error("serial write failed")]
    WriteFailure,
    #[error("serial read failed")]
    ReadFailure,
    /// The confirmed response does not belong to the issued command.
    #[error("unexpected reply")]
    UnexpectedReply,
}
