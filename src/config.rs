//! LLCP engine configuration trait.

use crate::link::queue::Producer;

// TODO: Use associated type defaults in the trait once stable

/// Trait for LLCP engine configurations.
///
/// Every application must define a type implementing this trait and supply it to [`Engine`].
/// It names the two queues the engine hands finished PDUs off to; both are owned and drained by
/// collaborators outside the engine (the radio scheduler and the host, respectively).
///
/// [`Engine`]: crate::link::procedure::Engine
pub trait Config {
    /// Queue of outgoing LL Control PDUs, drained by the Lower Link Layer / radio scheduler.
    type TxQueue: Producer;

    /// Queue of procedure-result notifications, drained by the Host.
    type NtfQueue: Producer;
}
