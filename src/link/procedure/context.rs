//! The procedure context: the unit of work tracked by a lane.

use crate::link::llcp::ControlOpcode;
use crate::link::procedure::local_fsm::LocalState;
use crate::link::procedure::remote_fsm::RemoteState;

/// The kind of control procedure a [`ProcedureContext`] is running.
///
/// Only version exchange is implemented; this enum exists so the lane and dispatcher machinery
/// are written against an open set of procedures rather than hardcoded to one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcedureKind {
    VersionExchange,
}

/// The inner, per-procedure state machine driving a context.
///
/// A context runs exactly one of these, picked by which lane allocated it: contexts queued on the
/// local lane run [`LocalState`], contexts queued on the remote lane run [`RemoteState`]. The two
/// state sets are not interchangeable -- see the module docs on [`crate::link::procedure`] for why
/// they aren't unified into a single FSM.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FsmState {
    Local(LocalState),
    Remote(RemoteState),
}

/// One in-flight control procedure.
///
/// Allocated from the engine's context pool, mutated only by the lane that owns it, and released
/// back to the pool when the procedure completes or the connection disconnects.
#[derive(Debug, Copy, Clone)]
pub struct ProcedureContext {
    kind: ProcedureKind,
    state: FsmState,
    /// The control-PDU opcode this context expects to receive next, if any.
    ///
    /// Set when a request or response is transmitted; the dispatcher matches this against an
    /// incoming PDU's opcode to decide whether to route it here.
    awaited_opcode: Option<ControlOpcode>,
    /// Set when an instant-based procedure's instant clashes with the peer's.
    ///
    /// Unused by version exchange; carried so the shared shape doesn't have to grow a field when a
    /// procedure that does use it is added.
    collision: bool,
    /// When set, the procedure must not transmit and must park in a waiting state on `Run`.
    pause: bool,
}

impl ProcedureContext {
    /// Creates a new context queued on the local lane, ready to run its first `Run` event.
    pub fn new_local(kind: ProcedureKind) -> Self {
        ProcedureContext {
            kind,
            state: FsmState::Local(LocalState::Idle),
            awaited_opcode: None,
            collision: false,
            pause: false,
        }
    }

    /// Creates a new context queued on the remote lane, ready to run its first `Run` event.
    pub fn new_remote(kind: ProcedureKind) -> Self {
        ProcedureContext {
            kind,
            state: FsmState::Remote(RemoteState::Idle),
            awaited_opcode: None,
            collision: false,
            pause: false,
        }
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn set_state(&mut self, state: FsmState) {
        self.state = state;
    }

    pub fn awaited_opcode(&self) -> Option<ControlOpcode> {
        self.awaited_opcode
    }

    pub fn set_awaited_opcode(&mut self, opcode: Option<ControlOpcode>) {
        self.awaited_opcode = opcode;
    }

    pub fn is_paused(&self) -> bool {
        self.pause
    }

    pub fn set_pause(&mut self, pause: bool) {
        self.pause = pause;
    }

    pub fn collision(&self) -> bool {
        self.collision
    }

    pub fn set_collision(&mut self, collision: bool) {
        self.collision = collision;
    }
}
