//! Version-exchange procedure: encoding, decoding, and the per-connection cached peer state.
//!
//! This is the only procedure kind currently implemented, but the codec shape (one
//! `encode_request`/`encode_response`/`encode_notification`/`decode` quartet per procedure kind)
//! is meant to generalize; future procedures plug into [`super::context::ProcedureKind`] and get
//! their own module here.

use crate::link::comp_id::CompanyId;
use crate::link::llcp::{ControlOpcode, VersionInd, VersionNumber};
use crate::link::queue::{Llid, Producer};
use crate::{
    bytes::{ByteWriter, DecodeAs},
    Error,
};

/// Wire size of an `LL_VERSION_IND` control PDU, opcode byte included.
const VERSION_IND_PDU_SIZE: u8 = 1 + core::mem::size_of::<VersionInd>() as u8;

/// This controller's own identity, written into every outgoing `LL_VERSION_IND`.
///
/// Configured once at startup; Bluetooth does not allow these values to change over a
/// controller's lifetime.
#[derive(Debug, Copy, Clone)]
pub struct LocalIdentity {
    pub version: VersionNumber,
    pub company_id: CompanyId,
    pub sub_version: u16,
}

/// The peer's version record, as decoded from their `LL_VERSION_IND`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeerVersion {
    pub version_number: u8,
    pub company_id: u16,
    pub sub_version: u16,
}

/// Per-connection cached version-exchange state.
///
/// `sent` is monotone: once an `LL_VERSION_IND` has been transmitted on a connection, the
/// connection must never transmit another one, and `conn_init` is the only thing that may clear
/// it (by replacing the whole connection's state).
#[derive(Debug, Copy, Clone)]
pub struct VersionExchangeState {
    sent: bool,
    peer: Option<PeerVersion>,
}

impl VersionExchangeState {
    pub const fn new() -> Self {
        VersionExchangeState {
            sent: false,
            peer: None,
        }
    }

    pub fn sent(&self) -> bool {
        self.sent
    }

    pub fn peer(&self) -> Option<PeerVersion> {
        self.peer
    }
}

/// Encodes an outgoing `LL_VERSION_IND` carrying `identity` into `queue`.
///
/// Used for both the request (local lane) and the response (remote lane); the wire shape is
/// identical, only the triggering event differs.
pub fn encode(queue: &mut impl Producer, identity: LocalIdentity) -> Result<(), Error> {
    queue.produce_with(VERSION_IND_PDU_SIZE, |writer: &mut ByteWriter<'_>| {
        write_version_ind(writer, identity.version, identity.company_id, identity.sub_version)?;
        Ok(Llid::Control)
    })
}

/// Encodes a host notification carrying the peer's cached version record into `queue`.
pub fn encode_notification(queue: &mut impl Producer, peer: PeerVersion) -> Result<(), Error> {
    queue.produce_with(VERSION_IND_PDU_SIZE, |writer: &mut ByteWriter<'_>| {
        write_version_ind(
            writer,
            VersionNumber::from(peer.version_number),
            CompanyId::from_raw(peer.company_id),
            peer.sub_version,
        )?;
        Ok(Llid::Control)
    })
}

fn write_version_ind(
    writer: &mut ByteWriter<'_>,
    version: VersionNumber,
    company_id: CompanyId,
    sub_version: u16,
) -> Result<(), Error> {
    writer.write_u8(ControlOpcode::VersionInd.into())?;
    writer.write_obj(&VersionInd::new(version, company_id, sub_version))
}

/// Decodes an incoming `LL_VERSION_IND`, returning the peer's version record.
///
/// `raw` is the control PDU starting at the opcode byte. Returns `Error::InvalidLength` if `raw`
/// doesn't decode to a `VERSION_IND` of the expected shape.
pub fn decode(raw: &[u8]) -> Result<PeerVersion, Error> {
    let opcode = *raw.first().ok_or(Error::Eof)?;
    if ControlOpcode::from(opcode) != ControlOpcode::VersionInd {
        return Err(Error::InvalidValue);
    }
    let body = &raw[1..];
    let ind: &VersionInd = body.decode_as().ok_or(Error::InvalidLength)?;
    Ok(PeerVersion {
        version_number: ind.vers_nr_raw(),
        company_id: ind.comp_id_raw(),
        sub_version: ind.sub_vers_nr_raw(),
    })
}

impl VersionExchangeState {
    /// Records the peer's decoded version record, marking the cache valid.
    pub fn record_peer(&mut self, peer: PeerVersion) {
        self.peer = Some(peer);
    }

    /// Marks our own `LL_VERSION_IND` as having been transmitted on this connection.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneShot {
        buf: [u8; 8],
        filled: Option<u8>,
    }

    impl OneShot {
        fn new() -> Self {
            OneShot {
                buf: [0; 8],
                filled: None,
            }
        }
    }

    impl Producer for OneShot {
        fn free_space(&self) -> u8 {
            if self.filled.is_some() {
                0
            } else {
                self.buf.len() as u8
            }
        }

        fn produce_dyn(
            &mut self,
            payload_bytes: u8,
            f: &mut dyn FnMut(&mut ByteWriter<'_>) -> Result<Llid, Error>,
        ) -> Result<(), Error> {
            if self.filled.is_some() || usize::from(payload_bytes) > self.buf.len() {
                return Err(Error::Eof);
            }
            let mut writer = ByteWriter::new(&mut self.buf);
            f(&mut writer)?;
            self.filled = Some(payload_bytes);
            Ok(())
        }
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let identity = LocalIdentity {
            version: VersionNumber::V5_0,
            company_id: CompanyId::from_raw(0x1234),
            sub_version: 0x5678,
        };
        let mut q = OneShot::new();
        encode(&mut q, identity).unwrap();

        let peer = decode(&q.buf[..6]).unwrap();
        assert_eq!(peer.version_number, 9); // V5_0
        assert_eq!(peer.company_id, 0x1234);
        assert_eq!(peer.sub_version, 0x5678);
    }

    #[test]
    fn decode_rejects_other_opcodes() {
        let raw = [ControlOpcode::FeatureReq.into(), 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode(&raw).unwrap_err(), Error::InvalidValue);
    }

    #[test]
    fn little_endian_round_trip() {
        let mut q = OneShot::new();
        encode_notification(
            &mut q,
            PeerVersion {
                version_number: 0x0A,
                company_id: 0x1234,
                sub_version: 0x5678,
            },
        )
        .unwrap();
        // opcode, vers_nr, comp_id lo/hi, sub_vers_nr lo/hi
        assert_eq!(&q.buf[..6], &[0x0C, 0x0A, 0x34, 0x12, 0x78, 0x56]);
    }
}
