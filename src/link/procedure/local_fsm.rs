//! Local-lane procedure FSM: states `{Idle, WaitTx, WaitRx, WaitNtf}`, driving procedures this
//! controller initiated.
//!
//! Request then receive: the local side first checks whether it even needs to transmit (the
//! connection may already have exchanged versions), gates on a transmit buffer, then gates on a
//! notification buffer once the response arrives. That ordering -- `tx` before `ntf` -- is the
//! reason this FSM isn't unified with [`super::remote_fsm`], which gates the other way around.

use crate::link::procedure::context::{FsmState, ProcedureContext};
use crate::link::procedure::version_exchange::{LocalIdentity, VersionExchangeState};
use crate::link::queue::Producer;

/// States of the local-lane procedure FSM.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LocalState {
    Idle,
    WaitTx,
    WaitRx,
    WaitNtf,
}

/// Outcome of driving the local FSM one step: whether the owning lane should signal `Complete`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LaneSignal {
    None,
    Complete,
}

fn state_of(ctx: &ProcedureContext) -> LocalState {
    match ctx.state() {
        FsmState::Local(s) => s,
        FsmState::Remote(_) => unreachable!("local FSM driven with a remote-lane context"),
    }
}

fn set(ctx: &mut ProcedureContext, state: LocalState) {
    ctx.set_state(FsmState::Local(state));
}

/// `Run` event: drives `Idle`, `WaitTx` and `WaitNtf` forward; `WaitRx` ignores it.
///
/// `WaitTx` and `WaitNtf` re-run the same gated action that parked them there in the first place;
/// the source leaves their handlers empty (see the module docs on [`crate::link::procedure`]), so
/// this crate adds the retry-on-next-`Run` behavior itself.
pub fn on_run(
    ctx: &mut ProcedureContext,
    identity: LocalIdentity,
    vex: &mut VersionExchangeState,
    tx: &mut impl Producer,
    ntf: &mut impl Producer,
) -> LaneSignal {
    match state_of(ctx) {
        LocalState::Idle | LocalState::WaitTx => attempt_request(ctx, identity, vex, tx, ntf),
        LocalState::WaitNtf => attempt_complete(ctx, vex, ntf),
        LocalState::WaitRx => LaneSignal::None,
    }
}

/// `Response` event: only dispatched while in `WaitRx`, matching every other state ignoring events
/// not listed for it. The dispatcher matches on `awaited_opcode` alone, so a second `VERSION_IND`
/// arriving while this context is parked in `WaitNtf` (notification buffer exhausted) must not be
/// re-decoded and re-completed.
pub fn on_response(
    ctx: &mut ProcedureContext,
    vex: &mut VersionExchangeState,
    ntf: &mut impl Producer,
    peer: crate::link::procedure::version_exchange::PeerVersion,
) -> LaneSignal {
    if state_of(ctx) != LocalState::WaitRx {
        return LaneSignal::None;
    }
    vex.record_peer(peer);
    attempt_complete(ctx, vex, ntf)
}

/// Shared by `Idle` and `WaitTx`: transmit the request if one is still needed and a buffer is
/// free, otherwise park (or skip straight to completion if we already sent on this connection).
fn attempt_request(
    ctx: &mut ProcedureContext,
    identity: LocalIdentity,
    vex: &mut VersionExchangeState,
    tx: &mut impl Producer,
    ntf: &mut impl Producer,
) -> LaneSignal {
    if ctx.is_paused() {
        set(ctx, LocalState::WaitTx);
        return LaneSignal::None;
    }

    if vex.sent() {
        // Already exchanged versions on this connection; nothing to transmit, go straight to
        // completion using whatever we have cached.
        return attempt_complete(ctx, vex, ntf);
    }

    if tx.free_space() == 0 {
        set(ctx, LocalState::WaitTx);
        return LaneSignal::None;
    }

    super::version_exchange::encode(tx, identity).expect("checked free_space above");
    vex.mark_sent();
    ctx.set_awaited_opcode(Some(crate::link::llcp::ControlOpcode::VersionInd));
    set(ctx, LocalState::WaitRx);
    LaneSignal::None
}

/// Shared by the post-decode path and `WaitNtf`: deliver a notification to the host if a buffer
/// is free, otherwise park.
fn attempt_complete(
    ctx: &mut ProcedureContext,
    vex: &mut VersionExchangeState,
    ntf: &mut impl Producer,
) -> LaneSignal {
    let peer = match vex.peer() {
        Some(peer) => peer,
        None => {
            // No peer record cached yet (e.g. re-entering WaitNtf before a response ever
            // arrived cannot happen in practice, but fail safe rather than panic).
            set(ctx, LocalState::WaitNtf);
            return LaneSignal::None;
        }
    };

    if ntf.free_space() == 0 {
        set(ctx, LocalState::WaitNtf);
        return LaneSignal::None;
    }

    super::version_exchange::encode_notification(ntf, peer).expect("checked free_space above");
    set(ctx, LocalState::Idle);
    LaneSignal::Complete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::comp_id::CompanyId;
    use crate::link::llcp::VersionNumber;
    use crate::link::procedure::context::ProcedureKind;
    use crate::link::procedure::version_exchange::PeerVersion;
    use crate::{bytes::ByteWriter, link::queue::Llid, Error};

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

    #[test]
    fn happy_path_transmits_then_completes_on_response() {
        let mut ctx = ProcedureContext::new_local(ProcedureKind::VersionExchange);
        let mut vex = VersionExchangeState::new();
        let mut tx = Slot::new(6);
        let mut ntf = Slot::new(6);

        assert_eq!(
            on_run(&mut ctx, identity(), &mut vex, &mut tx, &mut ntf),
            LaneSignal::None
        );
        assert_eq!(state_of(&ctx), LocalState::WaitRx);
        assert!(tx.filled);
        assert!(vex.sent());

        let peer = PeerVersion {
            version_number: 0x0A,
            company_id: 0x1234,
            sub_version: 0x5678,
        };
        assert_eq!(
            on_response(&mut ctx, &mut vex, &mut ntf, peer),
            LaneSignal::Complete
        );
        assert_eq!(state_of(&ctx), LocalState::Idle);
        assert!(ntf.filled);
    }

    #[test]
    fn tx_exhaustion_parks_in_wait_tx_then_retries() {
        let mut ctx = ProcedureContext::new_local(ProcedureKind::VersionExchange);
        let mut vex = VersionExchangeState::new();
        let mut tx = Slot::new(0);
        let mut ntf = Slot::new(6);

        on_run(&mut ctx, identity(), &mut vex, &mut tx, &mut ntf);
        assert_eq!(state_of(&ctx), LocalState::WaitTx);
        assert!(!vex.sent());

        tx.capacity = 6;
        on_run(&mut ctx, identity(), &mut vex, &mut tx, &mut ntf);
        assert_eq!(state_of(&ctx), LocalState::WaitRx);
        assert!(vex.sent());
    }

    #[test]
    fn already_sent_skips_transmission_and_completes_from_cache() {
        let mut ctx = ProcedureContext::new_local(ProcedureKind::VersionExchange);
        let mut vex = VersionExchangeState::new();
        vex.mark_sent();
        vex.record_peer(PeerVersion {
            version_number: 0x0A,
            company_id: 0x1234,
            sub_version: 0x5678,
        });
        let mut tx = Slot::new(6);
        let mut ntf = Slot::new(6);

        assert_eq!(
            on_run(&mut ctx, identity(), &mut vex, &mut tx, &mut ntf),
            LaneSignal::Complete
        );
        assert!(!tx.filled, "must not transmit a second VERSION_IND");
        assert!(ntf.filled);
        assert_eq!(state_of(&ctx), LocalState::Idle);
    }
}
