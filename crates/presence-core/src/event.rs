//! Abstract events consumed by the lifecycle state machine, and the fixed
//! table mapping process-level notifications onto them.

use std::fmt;

/// Everything the state machine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceEvent {
    /// The configuration file changed on disk.
    ConfigChanged,
    /// Stop broadcasting presence until resumed.
    PauseRequested,
    /// Start broadcasting again.
    ResumeRequested,
    /// Disconnect and stop processing events.
    TerminateRequested,
}

impl fmt::Display for PresenceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConfigChanged => "config-changed",
            Self::PauseRequested => "pause-requested",
            Self::ResumeRequested => "resume-requested",
            Self::TerminateRequested => "terminate-requested",
        };
        f.write_str(name)
    }
}

/// Process-level notifications the daemon subscribes to.
///
/// Uncatchable signals (SIGKILL, SIGSTOP) have no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessSignal {
    Interrupt,
    Terminate,
    Hangup,
    Quit,
    TerminalStop,
    Continue,
    User1,
    User2,
    CtrlC,
    CtrlBreak,
    CtrlClose,
    CtrlShutdown,
}

impl ProcessSignal {
    /// Signals subscribed on Unix.
    pub const UNIX: &'static [ProcessSignal] = &[
        Self::Interrupt,
        Self::Terminate,
        Self::Hangup,
        Self::Quit,
        Self::TerminalStop,
        Self::Continue,
        Self::User1,
        Self::User2,
    ];

    /// Console control events subscribed on Windows.
    pub const WINDOWS: &'static [ProcessSignal] = &[
        Self::CtrlC,
        Self::CtrlBreak,
        Self::CtrlClose,
        Self::CtrlShutdown,
    ];

    /// The event this notification maps to.
    pub fn event(self) -> PresenceEvent {
        match self {
            Self::Interrupt
            | Self::Terminate
            | Self::Hangup
            | Self::Quit
            | Self::CtrlC
            | Self::CtrlBreak
            | Self::CtrlClose
            | Self::CtrlShutdown => PresenceEvent::TerminateRequested,
            Self::TerminalStop | Self::User1 => PresenceEvent::PauseRequested,
            Self::Continue | Self::User2 => PresenceEvent::ResumeRequested,
        }
    }

    /// Conventional name, for log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
            Self::TerminalStop => "SIGTSTP",
            Self::Continue => "SIGCONT",
            Self::User1 => "SIGUSR1",
            Self::User2 => "SIGUSR2",
            Self::CtrlC => "CTRL_C",
            Self::CtrlBreak => "CTRL_BREAK",
            Self::CtrlClose => "CTRL_CLOSE",
            Self::CtrlShutdown => "CTRL_SHUTDOWN",
        }
    }
}
