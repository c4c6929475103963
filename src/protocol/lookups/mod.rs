//! Protocol enumerations: group-function codes and their error codes, ISO
//! acknowledgement control codes, PGN list kinds and node operating modes.
//!
//! Every code enum converts from its wire byte with `TryFrom<u8>` (the
//! unknown byte is returned as the error) and back with `as u8`.

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    other => Err(other),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

//==================================================================================GROUP_FUNCTION
wire_enum! {
    /// First byte of a PGN 126208 message.
    pub enum GroupFunctionCode {
        Request = 0,
        Command = 1,
        Acknowledge = 2,
        Read = 3,
        ReadReply = 4,
        Write = 5,
        WriteReply = 6,
    }
}

wire_enum! {
    /// PGN-level outcome reported in a group-function acknowledgement.
    pub enum PgnErrorCode {
        Acknowledge = 0,
        PgnNotSupported = 1,
        PgnTemporarilyNotAvailable = 2,
        AccessDenied = 3,
        RequestOrCommandNotSupported = 4,
        DefinerTagNotSupported = 5,
        ReadOrWriteNotSupported = 6,
    }
}

wire_enum! {
    /// Transmission interval or priority outcome in an acknowledgement.
    pub enum TransmissionOrPriorityErrorCode {
        Acknowledge = 0,
        IntervalOrPriorityNotSupported = 1,
        IntervalTooLow = 2,
        AccessDenied = 3,
        RequestNotSupported = 4,
    }
}

wire_enum! {
    /// Per-field outcome in an acknowledgement, packed two per byte.
    pub enum ParameterErrorCode {
        Acknowledge = 0,
        InvalidParameterField = 1,
        TemporarilyUnableToComply = 2,
        ParameterOutOfRange = 3,
        AccessDenied = 4,
        RequestOrCommandNotSupported = 5,
        ReadOrWriteNotSupported = 6,
    }
}

//==================================================================================ISO
wire_enum! {
    /// Control byte of an ISO acknowledgement (PGN 59392).
    pub enum AckControl {
        Ack = 0,
        Nak = 1,
        AccessDenied = 2,
        AddressBusy = 3,
    }
}

wire_enum! {
    /// First byte of a PGN 126464 message.
    pub enum PgnListKind {
        Transmit = 0,
        Receive = 1,
    }
}

//==================================================================================NODE_MODE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// How the node takes part in the bus.
pub enum NodeMode {
    /// Receive everything, never transmit.
    ListenOnly,
    /// Full node for devices that mostly publish data.
    NodeOnly,
    /// Full node: claims an address, answers system requests and listens.
    #[default]
    ListenAndNode,
    /// Transmit without claiming an address or handling system messages.
    SendOnly,
    /// Like `SendOnly`, for hosts that also listen.
    ListenAndSend,
}

impl NodeMode {
    /// Claims an address and answers system messages.
    pub const fn is_active_node(&self) -> bool {
        matches!(self, NodeMode::NodeOnly | NodeMode::ListenAndNode)
    }

    /// Allowed to put frames on the bus.
    pub const fn can_transmit(&self) -> bool {
        !matches!(self, NodeMode::ListenOnly)
    }
}
