//! Core link types: close codes, close frames and link state.

/// Close code carried by a link shutdown.
///
/// Values follow the WebSocket close code registry, so a WebSocket link
/// maps them one-to-one. Other transports pick the closest code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure; the purpose of the connection was fulfilled.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// The peer is going away (server shutdown, page navigation).
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// Protocol error.
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// No status code was present in the close frame.
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// Connection dropped without a close frame.
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    /// Unexpected condition on the server.
    pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);
    /// Link force-closed after too many missed heartbeat acknowledgments.
    pub const HEARTBEAT_TIMEOUT: CloseCode = CloseCode(4000);

    /// Check if this code denotes an expected, graceful closure.
    ///
    /// Clean closures never trigger a reconnect.
    pub fn is_clean(&self) -> bool {
        *self == Self::NORMAL || *self == Self::GOING_AWAY
    }
}

impl Default for CloseCode {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Close code plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseFrame {
    /// Close code.
    pub code: CloseCode,
    /// Reason text, possibly empty.
    pub reason: String,
}

impl CloseFrame {
    /// Create a close frame.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Frame sent when the application closes the manager.
    pub fn manual() -> Self {
        Self::new(CloseCode::NORMAL, "manual close")
    }

    /// Frame used when heartbeat acknowledgments stop arriving.
    pub fn heartbeat_timeout() -> Self {
        Self::new(CloseCode::HEARTBEAT_TIMEOUT, "heartbeat timeout")
    }

    /// Frame reported when a link drops without a close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::ABNORMAL, reason)
    }

    /// Check if this frame denotes an expected closure.
    pub fn is_clean(&self) -> bool {
        self.code.is_clean()
    }
}

impl std::fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// State reported by a transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LinkState {
    /// Handshake in progress.
    Connecting = 0,
    /// Ready to carry messages.
    Open = 1,
    /// Close requested, waiting for the peer.
    Closing = 2,
    /// Fully closed.
    Closed = 3,
}

impl LinkState {
    /// Create a LinkState from a raw byte value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Connecting),
            1 => Some(Self::Open),
            2 => Some(Self::Closing),
            3 => Some(Self::Closed),
            _ => None,
        }
    }

    /// Check if the link can carry messages.
    pub fn is_open(&self) -> bool {
        *self == Self::Open
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::Connecting
    }
}
