//! Procedure dispatcher: the engine handle, the per-connection object, and the public API that
//! drives the two request lanes and routes incoming control PDUs to them.
//!
//! The local and remote lanes are near-identical in shape (see [`local_fsm`] and [`remote_fsm`])
//! but not unified, because the two sides gate their buffer acquisitions in a different order:
//! locally we request then receive (`tx` before `ntf`); remotely we receive then respond (`tx`
//! only). Collapsing them into one FSM would hide that asymmetry.

pub mod context;
pub mod lane;
pub mod local_fsm;
pub mod remote_fsm;
pub mod version_exchange;

use crate::config::Config;
use crate::link::llcp::ControlOpcode;
use crate::link::procedure::context::{ProcedureContext, ProcedureKind};
use crate::link::procedure::lane::{Lane, LaneState};
use crate::link::procedure::version_exchange::{LocalIdentity, VersionExchangeState};
use crate::pool::Pool;

/// Outcome of [`Engine::submit_version_exchange`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Success,
    CommandDisallowed,
}

/// Process-wide engine state: the procedure-context pool and the identity written into every
/// outgoing `VERSION_IND`.
///
/// The context pool is the one resource genuinely shared across connections (see the module docs
/// on [`crate::pool`]); everything else -- lanes, cached peer state, the TX queue -- is
/// per-connection and lives on [`Connection`]. Passing `&mut Engine` into every entry point
/// alongside `&mut Connection` avoids a hidden process-global singleton.
pub struct Engine<C: Config, const CTX_CAP: usize = 1> {
    contexts: Pool<ProcedureContext, CTX_CAP>,
    identity: LocalIdentity,
    _config: core::marker::PhantomData<C>,
}

impl<C: Config, const CTX_CAP: usize> Engine<C, CTX_CAP> {
    /// Initializes the context pool and records this controller's identity.
    ///
    /// Idempotent: constructing a new `Engine` always starts with every slot free. Must happen
    /// before any [`Connection`] is driven.
    pub fn new(identity: LocalIdentity) -> Self {
        Engine {
            contexts: Pool::new(),
            identity,
            _config: core::marker::PhantomData,
        }
    }

    /// The identity this engine writes into outgoing `VERSION_IND` PDUs.
    pub fn identity(&self) -> LocalIdentity {
        self.identity
    }

    /// `submit_version_exchange(conn)`: allocates a context on the local lane.
    ///
    /// Returns [`Status::CommandDisallowed`] if the context pool is exhausted; this is the one
    /// error that crosses the API boundary (see the crate's design notes on error handling).
    pub fn submit_version_exchange<const LANE_CAP: usize>(
        &mut self,
        conn: &mut Connection<C, LANE_CAP>,
    ) -> Status {
        if !self.contexts.is_free() {
            return Status::CommandDisallowed;
        }
        let handle = self
            .contexts
            .acquire(ProcedureContext::new_local(ProcedureKind::VersionExchange))
            .expect("checked is_free above");
        if conn.local.queue_mut().push_back(handle).is_err() {
            self.contexts.release(handle);
            return Status::CommandDisallowed;
        }
        Status::Success
    }

    /// `connect(conn)`: delivers `Connect` to both lanes.
    pub fn connect<const LANE_CAP: usize>(&mut self, conn: &mut Connection<C, LANE_CAP>) {
        conn.local.connect();
        conn.remote.connect();
    }

    /// `disconnect(conn)`: drains both lanes, releasing every context back to the pool, and parks
    /// both lane FSMs in `Disconnected`.
    pub fn disconnect<const LANE_CAP: usize>(&mut self, conn: &mut Connection<C, LANE_CAP>) {
        let contexts = &mut self.contexts;
        conn.local.disconnect(|h| contexts.release(h));
        conn.remote.disconnect(|h| contexts.release(h));
    }

    /// `run(conn)`: fires `Run` on the remote lane, then the local lane.
    ///
    /// The ordering gives remote-initiated procedures priority when both lanes are ready, matching
    /// the requirement that a responder must not starve the initiator.
    pub fn run<const LANE_CAP: usize>(&mut self, conn: &mut Connection<C, LANE_CAP>) {
        self.run_remote(conn);
        self.run_local(conn);
    }

    fn run_local<const LANE_CAP: usize>(&mut self, conn: &mut Connection<C, LANE_CAP>) {
        let handle = match conn.local.run() {
            Some(handle) => handle,
            None => return,
        };
        let ctx = self.contexts.get_mut(handle);
        let signal = local_fsm::on_run(
            ctx,
            self.identity,
            &mut conn.version_exchange,
            &mut conn.tx,
            &mut conn.ntf,
        );
        if signal == local_fsm::LaneSignal::Complete {
            if let Some(done) = conn.local.complete() {
                self.contexts.release(done);
            }
        }
    }

    fn run_remote<const LANE_CAP: usize>(&mut self, conn: &mut Connection<C, LANE_CAP>) {
        let handle = match conn.remote.run() {
            Some(handle) => handle,
            None => return,
        };
        let ctx = self.contexts.get_mut(handle);
        let signal = remote_fsm::on_run(ctx, self.identity, &mut conn.version_exchange, &mut conn.tx);
        if signal == remote_fsm::LaneSignal::Complete {
            if let Some(done) = conn.remote.complete() {
                self.contexts.release(done);
            }
        }
    }

    /// `rx(conn, pdu)`: dispatches an incoming control PDU.
    ///
    /// `pdu` is the control PDU starting at the opcode byte. Routes to whichever lane's head
    /// context is awaiting this opcode, or spawns a new remote procedure.
    ///
    /// # Panics
    ///
    /// Panics if `pdu`'s opcode doesn't map to a known procedure kind, or if a remote procedure
    /// receives a repeat `VERSION_IND` after already completing -- both are fatal protocol
    /// violations in the current scope (see the crate's design notes on error handling).
    ///
    /// Must not be called while `conn` is disconnected.
    pub fn rx<const LANE_CAP: usize>(&mut self, conn: &mut Connection<C, LANE_CAP>, pdu: &[u8]) {
        let opcode = ControlOpcode::from(*pdu.first().expect("empty control PDU"));

        if let Some(handle) = conn.local.queue().front() {
            let ctx = self.contexts.get(handle);
            if ctx.awaited_opcode() == Some(opcode) {
                debug!("rx: routing {:?} to local lane", opcode);
                let peer = version_exchange::decode(pdu).expect("opcode already matched");
                let ctx = self.contexts.get_mut(handle);
                let signal =
                    local_fsm::on_response(ctx, &mut conn.version_exchange, &mut conn.ntf, peer);
                if signal == local_fsm::LaneSignal::Complete {
                    if let Some(done) = conn.local.complete() {
                        self.contexts.release(done);
                    }
                }
                return;
            }
        }

        if let Some(handle) = conn.remote.queue().front() {
            let ctx = self.contexts.get(handle);
            if ctx.awaited_opcode() == Some(opcode) {
                debug!("rx: routing {:?} to remote lane", opcode);
                let peer = version_exchange::decode(pdu).expect("opcode already matched");
                let ctx = self.contexts.get_mut(handle);
                let signal = remote_fsm::on_request(
                    ctx,
                    self.identity,
                    &mut conn.version_exchange,
                    &mut conn.tx,
                    peer,
                );
                if signal == remote_fsm::LaneSignal::Complete {
                    if let Some(done) = conn.remote.complete() {
                        self.contexts.release(done);
                    }
                }
                return;
            }
        }

        self.spawn_remote_procedure(conn, opcode, pdu);
    }

    fn spawn_remote_procedure<const LANE_CAP: usize>(
        &mut self,
        conn: &mut Connection<C, LANE_CAP>,
        opcode: ControlOpcode,
        pdu: &[u8],
    ) {
        let kind = match opcode {
            ControlOpcode::VersionInd => ProcedureKind::VersionExchange,
            other => panic!("unrecognized control opcode {:?} for a new remote procedure", other),
        };

        let handle = match self.contexts.acquire(ProcedureContext::new_remote(kind)) {
            Some(handle) => handle,
            None => {
                warn!("remote procedure dropped: context pool exhausted");
                return;
            }
        };
        if conn.remote.queue_mut().push_back(handle).is_err() {
            self.contexts.release(handle);
            warn!("remote procedure dropped: lane queue full");
            return;
        }

        // The intervening `Run` is load-bearing: it moves the fresh context from `Idle` to
        // `WaitRx` so the `Request` below isn't dropped by a context not yet expecting it.
        self.run_remote(conn);
        info!("rx: spawned new remote procedure for {:?}", opcode);
        self.rx(conn, pdu);
    }
}

/// Per-connection state: the two request lanes, cached version-exchange state, and the
/// connection's own transmit queue.
///
/// The transmit queue is per-connection (each connection has its own radio-scheduled transmit
/// path) while the notification queue is shared at the engine/host boundary; both are named by
/// [`Config`].
pub struct Connection<C: Config, const LANE_CAP: usize = 1> {
    local: Lane<LANE_CAP>,
    remote: Lane<LANE_CAP>,
    version_exchange: VersionExchangeState,
    tx: C::TxQueue,
    ntf: C::NtfQueue,
}

impl<C: Config, const LANE_CAP: usize> Connection<C, LANE_CAP> {
    /// `conn_init(conn)`: places both lanes in `Disconnected`, empties their queues, and clears
    /// the version cache.
    pub fn new(tx: C::TxQueue, ntf: C::NtfQueue) -> Self {
        Connection {
            local: Lane::new(),
            remote: Lane::new(),
            version_exchange: VersionExchangeState::new(),
            tx,
            ntf,
        }
    }

    pub fn local_lane_state(&self) -> LaneState {
        self.local.state()
    }

    pub fn remote_lane_state(&self) -> LaneState {
        self.remote.state()
    }

    pub fn version_exchange(&self) -> &VersionExchangeState {
        &self.version_exchange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::ByteWriter;
    use crate::link::comp_id::CompanyId;
    use crate::link::llcp::VersionNumber;
    use crate::link::queue::{Llid, Producer};
    use crate::Error;

    struct Slot {
        buf: [u8; 8],
        filled: Option<u8>,
        capacity: u8,
    }

    impl Slot {
        fn with_capacity(capacity: u8) -> Self {
            Slot {
                buf: [0; 8],
                filled: None,
                capacity,
            }
        }
    }

    impl Producer for Slot {
        fn free_space(&self) -> u8 {
            if self.filled.is_some() {
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
            if self.filled.is_some() || payload_bytes > self.capacity {
                return Err(Error::Eof);
            }
            let mut writer = ByteWriter::new(&mut self.buf);
            f(&mut writer)?;
            self.filled = Some(payload_bytes);
            Ok(())
        }
    }

    struct TestConfig;

    impl Config for TestConfig {
        type TxQueue = Slot;
        type NtfQueue = Slot;
    }

    fn identity() -> LocalIdentity {
        LocalIdentity {
            version: VersionNumber::V5_0,
            company_id: CompanyId::from_raw(0x1234),
            sub_version: 0x5678,
        }
    }

    fn peer_version_ind() -> [u8; 6] {
        // opcode, vers_nr, comp_id LE, sub_vers_nr LE
        [0x0C, 0x0A, 0x34, 0x12, 0x78, 0x56]
    }

    fn new_connection() -> Connection<TestConfig, 1> {
        Connection::new(Slot::with_capacity(6), Slot::with_capacity(6))
    }

    #[test]
    fn local_happy_path() {
        let mut engine: Engine<TestConfig, 1> = Engine::new(identity());
        let mut conn = new_connection();
        engine.connect(&mut conn);

        assert_eq!(engine.submit_version_exchange(&mut conn), Status::Success);
        engine.run(&mut conn);
        assert!(conn.tx.filled.is_some());
        assert_eq!(conn.local_lane_state(), LaneState::Active);

        engine.rx(&mut conn, &peer_version_ind());
        assert!(conn.ntf.filled.is_some());
        assert_eq!(conn.local_lane_state(), LaneState::Idle);
        assert_eq!(engine.contexts.free_count(), 1);
    }

    #[test]
    fn remote_happy_path_no_notification() {
        let mut engine: Engine<TestConfig, 1> = Engine::new(identity());
        let mut conn = new_connection();
        engine.connect(&mut conn);

        engine.rx(&mut conn, &peer_version_ind());
        assert!(conn.tx.filled.is_some());
        assert!(conn.ntf.filled.is_none(), "remote side must not notify the host");
        assert_eq!(conn.remote_lane_state(), LaneState::Idle);
        assert_eq!(engine.contexts.free_count(), 1);
    }

    #[test]
    fn local_request_when_peer_already_known_skips_transmission() {
        let mut engine: Engine<TestConfig, 1> = Engine::new(identity());
        let mut conn = new_connection();
        engine.connect(&mut conn);

        engine.rx(&mut conn, &peer_version_ind());
        conn.tx = Slot::with_capacity(6);
        conn.ntf = Slot::with_capacity(6);

        assert_eq!(engine.submit_version_exchange(&mut conn), Status::Success);
        engine.run(&mut conn);

        assert!(conn.tx.filled.is_none(), "must not re-transmit VERSION_IND");
        assert!(conn.ntf.filled.is_some());
        assert_eq!(conn.local_lane_state(), LaneState::Idle);
    }

    #[test]
    fn tx_exhaustion_backpressure_then_recovers() {
        let mut engine: Engine<TestConfig, 1> = Engine::new(identity());
        let mut conn = new_connection();
        engine.connect(&mut conn);
        conn.tx = Slot::with_capacity(0);

        engine.submit_version_exchange(&mut conn);
        engine.run(&mut conn);
        assert!(conn.tx.filled.is_none());
        assert_eq!(engine.contexts.free_count(), 0, "context must not leak while parked");

        conn.tx = Slot::with_capacity(6);
        engine.run(&mut conn);
        assert!(conn.tx.filled.is_some());
    }

    #[test]
    fn dispatcher_routes_to_local_when_awaited_else_spawns_remote() {
        let mut engine: Engine<TestConfig, 1> = Engine::new(identity());
        let mut conn = new_connection();
        engine.connect(&mut conn);

        engine.submit_version_exchange(&mut conn);
        engine.run(&mut conn);
        assert_eq!(conn.local_lane_state(), LaneState::Active);

        engine.rx(&mut conn, &peer_version_ind());
        assert_eq!(conn.local_lane_state(), LaneState::Idle, "must route to local, not spawn remote");
        assert_eq!(conn.remote_lane_state(), LaneState::Idle);
    }

    #[test]
    fn disconnect_drains_and_subsequent_run_is_noop() {
        let mut engine: Engine<TestConfig, 2> = Engine::new(identity());
        let mut conn: Connection<TestConfig, 2> = Connection::new(Slot::with_capacity(6), Slot::with_capacity(6));
        engine.connect(&mut conn);

        engine.submit_version_exchange(&mut conn);
        engine.disconnect(&mut conn);

        assert_eq!(conn.local_lane_state(), LaneState::Disconnected);
        assert_eq!(conn.remote_lane_state(), LaneState::Disconnected);
        assert_eq!(engine.contexts.free_count(), 2);

        engine.run(&mut conn);
        assert!(conn.tx.filled.is_none());
    }

    #[test]
    fn command_disallowed_when_context_pool_exhausted() {
        let mut engine: Engine<TestConfig, 1> = Engine::new(identity());
        let mut conn = new_connection();
        engine.connect(&mut conn);

        assert_eq!(engine.submit_version_exchange(&mut conn), Status::Success);
        assert_eq!(engine.submit_version_exchange(&mut conn), Status::CommandDisallowed);
    }
}
