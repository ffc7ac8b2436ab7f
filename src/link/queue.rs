//! The producer-side queue interface used to hand finished PDUs to an external collaborator.
//!
//! The engine never owns the queues its PDUs end up in: outgoing LL Control PDUs are drained by
//! the Lower Link Layer / radio scheduler, and notifications are drained by the Host. Both are
//! named by a [`crate::config::Config`] as an associated [`Producer`] type.
//!
//! This module defines only the producing half of that interface. There is no matching `Consumer`
//! trait here, because the engine is never on the consuming end of either queue; a consumer-side
//! trait would describe someone else's code, not this crate's.

use crate::{bytes::*, Error};

/// Link layer identifier, distinguishing control PDUs from data PDUs on the wire.
///
/// Only the two values relevant to the LLCP engine are named; anything else observed on the wire
/// is a framing error handled below this layer, so there is no catch-all variant here.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Llid {
    /// LL Control PDU.
    Control,
    /// Start of an L2CAP message, or a complete message that fits into a single PDU.
    DataStart,
    /// Continuation of an L2CAP message.
    DataContinue,
}

/// The producing (writing) half of a queue that accepts encoded PDUs.
///
/// Implementations back the two queues named by [`crate::config::Config`]: the outgoing
/// LL Control PDU queue and the Host notification queue. Both are filled the same way -- by
/// checking for space, then writing directly into the queue's storage -- so they share this one
/// trait rather than each growing a bespoke push method.
pub trait Producer {
    /// Returns the largest payload size that can be successfully enqueued in the current state.
    ///
    /// This is necessarily a conservative estimate, since the consuming side of the queue might
    /// remove an entry from the queue immediately after this function returns, creating more free
    /// space. Callers must use this to decide whether to attempt an enqueue at all; they must not
    /// attempt an enqueue speculatively and release the slot again on failure, since the pool this
    /// queue draws storage from may be shared and externally observable.
    ///
    /// After a call to this method, the next call to `produce_with` must not fail when a
    /// `payload_bytes` value less than or equal to the returned free payload space is passed.
    fn free_space(&self) -> u8;

    /// Enqueues a PDU of known size using a closure.
    ///
    /// *This is an object-safe method complemented by its generic counterpart `produce_with`. Only
    /// this method needs to be implemented.*
    ///
    /// This will check if `payload_bytes` are available in the queue, and bail with `Error::Eof`
    /// if not. If sufficient space is available, a `ByteWriter` with access to that space is
    /// constructed and `f` is called. If `f` returns a successful result, the data is committed to
    /// the queue. If not, the queue is left unchanged.
    fn produce_dyn(
        &mut self,
        payload_bytes: u8,
        f: &mut dyn FnMut(&mut ByteWriter<'_>) -> Result<Llid, Error>,
    ) -> Result<(), Error>;

    /// Enqueues a PDU of known size using a closure.
    ///
    /// This will check if `payload_bytes` are available in the queue, and bail with `Error::Eof`
    /// if not. If sufficient space is available, a `ByteWriter` with access to that space is
    /// constructed and `f` is called. If `f` returns a successful result, the data is committed to
    /// the queue. If not, the queue is left unchanged.
    fn produce_with<E>(
        &mut self,
        payload_bytes: u8,
        f: impl FnOnce(&mut ByteWriter<'_>) -> Result<Llid, E>,
    ) -> Result<(), E>
    where
        E: From<Error>,
        Self: Sized,
    {
        // This forwards to `produce_dyn`, but the call should be trivial to devirtualize (only
        // simple constant propagation is needed). The `Option`s should then be trivial to optimize
        // out as well.

        let mut f = Some(f);
        let mut r = None;
        self.produce_dyn(payload_bytes, &mut |bytes| {
            let f = f.take().unwrap();
            let result = f(bytes);
            if let Ok(llid) = result {
                r = Some(Ok(()));
                Ok(llid)
            } else {
                r = Some(result.map(|_| ()));
                Err(Error::InvalidValue)
            }
        })
        .ok();

        r.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A trivial single-slot `Producer` used to exercise the trait's default `produce_with`.
    struct OneShot {
        filled: Option<([u8; 4], u8)>,
    }

    impl Producer for OneShot {
        fn free_space(&self) -> u8 {
            if self.filled.is_some() {
                0
            } else {
                4
            }
        }

        fn produce_dyn(
            &mut self,
            payload_bytes: u8,
            f: &mut dyn FnMut(&mut ByteWriter<'_>) -> Result<Llid, Error>,
        ) -> Result<(), Error> {
            if self.filled.is_some() || payload_bytes > 4 {
                return Err(Error::Eof);
            }
            let mut buf = [0; 4];
            let mut writer = ByteWriter::new(&mut buf);
            f(&mut writer)?;
            self.filled = Some((buf, payload_bytes));
            Ok(())
        }
    }

    #[test]
    fn produce_with_commits_on_success() {
        let mut q = OneShot { filled: None };
        assert_eq!(q.free_space(), 4);
        q.produce_with(2, |w| -> Result<_, Error> {
            w.write_u16_le(0xABCD)?;
            Ok(Llid::Control)
        })
        .unwrap();
        assert_eq!(q.free_space(), 0);
        assert_eq!(q.filled.unwrap().0[..2], [0xCD, 0xAB]);
    }

    #[test]
    fn produce_with_rejects_when_full() {
        let mut q = OneShot {
            filled: Some(([0; 4], 0)),
        };
        let err = q
            .produce_with(1, |_| -> Result<_, Error> { Ok(Llid::Control) })
            .unwrap_err();
        assert_eq!(err, Error::Eof);
    }
}
