//! Remote-lane procedure FSM: states `{Idle, WaitRx, WaitTx, WaitNtf}`, driving procedures the
//! peer initiated.
//!
//! Receive then respond: the mirror image of [`super::local_fsm`]. There is no notification
//! buffer gating here for version exchange -- the peer's data arrived as the triggering request,
//! there's nothing left to hand the host once the response is sent -- so `WaitNtf` is carried for
//! shape parity with the local FSM but never entered.

use crate::link::procedure::context::{FsmState, ProcedureContext};
use crate::link::procedure::version_exchange::{LocalIdentity, PeerVersion, VersionExchangeState};
use crate::link::queue::Producer;
use crate::Error;

/// States of the remote-lane procedure FSM.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Idle,
    WaitRx,
    WaitTx,
    WaitNtf,
}

pub use super::local_fsm::LaneSignal;

fn state_of(ctx: &ProcedureContext) -> RemoteState {
    match ctx.state() {
        FsmState::Remote(s) => s,
        FsmState::Local(_) => unreachable!("remote FSM driven with a local-lane context"),
    }
}

fn set(ctx: &mut ProcedureContext, state: RemoteState) {
    ctx.set_state(FsmState::Remote(state));
}

/// `Run` event: `Idle` moves to `WaitRx` to await the peer's request; `WaitTx` retries the gated
/// response send that parked it there. `WaitRx` and `WaitNtf` ignore `Run`.
pub fn on_run(
    ctx: &mut ProcedureContext,
    identity: LocalIdentity,
    vex: &mut VersionExchangeState,
    tx: &mut impl Producer,
) -> LaneSignal {
    match state_of(ctx) {
        RemoteState::Idle => {
            ctx.set_awaited_opcode(Some(crate::link::llcp::ControlOpcode::VersionInd));
            set(ctx, RemoteState::WaitRx);
            LaneSignal::None
        }
        RemoteState::WaitTx => attempt_respond(ctx, identity, vex, tx),
        RemoteState::WaitRx | RemoteState::WaitNtf => LaneSignal::None,
    }
}

/// `Request` event: only dispatched while in `WaitRx`, matching every other state ignoring events
/// not listed for it. The dispatcher matches on `awaited_opcode` alone, so a delivery arriving
/// while this context is parked in `WaitTx` or `WaitNtf` must not be re-decoded and re-answered.
///
/// # Panics
///
/// Panics if the peer sends `LL_VERSION_IND` after version exchange has already completed on this
/// connection. This is a protocol violation; per the current design this is treated as fatal
/// rather than answered with `LL_REJECT_IND` (see the crate's design notes).
pub fn on_request(
    ctx: &mut ProcedureContext,
    identity: LocalIdentity,
    vex: &mut VersionExchangeState,
    tx: &mut impl Producer,
    peer: PeerVersion,
) -> LaneSignal {
    if state_of(ctx) != RemoteState::WaitRx {
        return LaneSignal::None;
    }

    if vex.sent() {
        panic!("peer re-sent LL_VERSION_IND after version exchange already completed");
    }

    vex.record_peer(peer);

    if ctx.is_paused() {
        set(ctx, RemoteState::WaitTx);
        return LaneSignal::None;
    }

    attempt_respond(ctx, identity, vex, tx)
}

/// Shared by the post-decode path and `WaitTx`: send the response if a transmit buffer is free,
/// otherwise park.
fn attempt_respond(
    ctx: &mut ProcedureContext,
    identity: LocalIdentity,
    vex: &mut VersionExchangeState,
    tx: &mut impl Producer,
) -> LaneSignal {
    if ctx.is_paused() {
        set(ctx, RemoteState::WaitTx);
        return LaneSignal::None;
    }

    if tx.free_space() == 0 {
        set(ctx, RemoteState::WaitTx);
        return LaneSignal::None;
    }

    send(tx, identity).expect("checked free_space above");
    vex.mark_sent();
    set(ctx, RemoteState::Idle);
    LaneSignal::Complete
}

fn send(tx: &mut impl Producer, identity: LocalIdentity) -> Result<(), Error> {
    super::version_exchange::encode(tx, identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::comp_id::CompanyId;
    use crate::link::llcp::VersionNumber;
    use crate::link::procedure::context::ProcedureKind;
    use crate::{bytes::ByteWriter, link::queue::Llid};

    struct Slot {
        buf: [u8; 8],
        filled: bool,
        capacity: u8,
    }

    impl Slot {
        fn new(capacity: u8) -> Self {
            Slot {
                buf: [0; 8],
                filled: false,
                capacity,
            }
        }
    }

    impl Producer for Slot {
        fn free_space(&self) -> u8 {
            if self.filled {
                0
            } else {
                self.capacity
            }
        }

        fn produce_dyn(
            &mut self,
            payload_bytes: u8,
            f: &mut dyn FnMut(&mut ByteWriter<'_>) -> Result<Llid, Error>,
        ) -> Result<(), Error> {
            if self.filled || payload_bytes > self.capacity {
                return Err(Error::Eof);
            }
            let mut writer = ByteWriter::new(&mut self.buf);
            f(&mut writer)?;
            self.filled = true;
            Ok(())
        }
    }

    fn identity() -> LocalIdentity {
        LocalIdentity {
            version: VersionNumber::V4_2,
            company_id: CompanyId::from_raw(0x0F0F),
            sub_version: 0x0001,
        }
    }

    fn peer() -> PeerVersion {
        PeerVersion {
            version_number: 0x0A,
            company_id: 0x1234,
            sub_version: 0x5678,
        }
    }

    #[test]
    fn happy_path_responds_without_notification() {
        let mut ctx = ProcedureContext::new_remote(ProcedureKind::VersionExchange);
        let mut vex = VersionExchangeState::new();
        let mut tx = Slot::new(6);

        assert_eq!(
            on_run(&mut ctx, identity(), &mut vex, &mut tx),
            LaneSignal::None
        );
        assert_eq!(state_of(&ctx), RemoteState::WaitRx);

        assert_eq!(
            on_request(&mut ctx, identity(), &mut vex, &mut tx, peer()),
            LaneSignal::Complete
        );
        assert_eq!(state_of(&ctx), RemoteState::Idle);
        assert!(tx.filled);
        assert!(vex.sent());
        assert_eq!(vex.peer(), Some(peer()));
    }

    #[test]
    fn tx_exhaustion_parks_then_retries_on_run() {
        let mut ctx = ProcedureContext::new_remote(ProcedureKind::VersionExchange);
        let mut vex = VersionExchangeState::new();
        let mut tx = Slot::new(0);

        on_run(&mut ctx, identity(), &mut vex, &mut tx);
        on_request(&mut ctx, identity(), &mut vex, &mut tx, peer());
        assert_eq!(state_of(&ctx), RemoteState::WaitTx);
        assert!(!vex.sent());

        tx.capacity = 6;
        assert_eq!(
            on_run(&mut ctx, identity(), &mut vex, &mut tx),
            LaneSignal::Complete
        );
        assert!(vex.sent());
    }

    #[test]
    #[should_panic(expected = "re-sent")]
    fn repeated_version_ind_after_completion_is_fatal() {
        let mut ctx = ProcedureContext::new_remote(ProcedureKind::VersionExchange);
        let mut vex = VersionExchangeState::new();
        vex.mark_sent();
        let mut tx = Slot::new(6);
        on_request(&mut ctx, identity(), &mut vex, &mut tx, peer());
    }
}
